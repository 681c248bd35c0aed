#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    use super::super::*;
    use crate::testutil::FakeAutomation;

    async fn manager() -> ViewportManager<FakeAutomation> {
        ViewportManager::new(FakeAutomation::new()).await.unwrap()
    }

    #[tokio::test]
    async fn adopts_initial_viewport_as_main() {
        let vm = manager().await;
        assert_eq!(vm.handle(Role::Main), Some(&1));
    }

    #[tokio::test]
    async fn ephemeral_success_cleans_up_and_restores_focus() {
        let mut vm = manager().await;

        let value = vm
            .with_ephemeral("https://site/dashboard", |auto| {
                Box::pin(async move {
                    assert_eq!(auto.focused_viewport().await?, 2);
                    Ok::<_, anyhow::Error>(42)
                })
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(vm.automation().live(), vec![1]);
        assert_eq!(vm.automation().focused(), Some(1));
        assert_eq!(
            vm.automation().navigations(),
            vec!["https://site/dashboard".to_string()]
        );
    }

    #[tokio::test]
    async fn ephemeral_task_failure_still_cleans_up() {
        let mut vm = manager().await;

        let result: Result<()> = vm
            .with_ephemeral("https://site/", |_auto| {
                Box::pin(async move { Err(anyhow!("task blew up")) })
            })
            .await;

        assert!(result.is_err());
        assert!(!KeeperError::is_viewport_loss(&result.unwrap_err()));
        assert_eq!(vm.automation().live(), vec![1]);
        assert_eq!(vm.automation().focused(), Some(1));
    }

    #[tokio::test]
    async fn vanished_ephemeral_skips_close_and_restores_focus() {
        let mut vm = manager().await;

        vm.with_ephemeral("https://site/", |auto| {
            Box::pin(async move {
                let h = auto.focused_viewport().await?;
                auto.vanish(h);
                Ok::<_, anyhow::Error>(())
            })
        })
        .await
        .unwrap();

        assert_eq!(vm.automation().closed(), 0);
        assert_eq!(vm.automation().focused(), Some(1));
    }

    #[tokio::test]
    async fn losing_every_viewport_is_fatal() {
        let mut vm = manager().await;

        let result: Result<()> = vm
            .with_ephemeral("https://site/", |auto| {
                Box::pin(async move {
                    auto.vanish_all();
                    Ok(())
                })
            })
            .await;

        assert!(KeeperError::is_viewport_loss(&result.unwrap_err()));
    }

    #[tokio::test]
    async fn focus_returns_to_prior_viewport_not_main() {
        let mut vm = manager().await;
        let second = vm.automation().open_viewport().await.unwrap();
        vm.automation().focus_viewport(&second).await.unwrap();

        vm.with_ephemeral("https://site/", |_auto| {
            Box::pin(async move { Ok::<_, anyhow::Error>(()) })
        })
        .await
        .unwrap();

        assert_eq!(vm.automation().focused(), Some(second));
    }

    #[tokio::test]
    async fn focus_falls_back_to_main_when_prior_is_gone() {
        let mut vm = manager().await;
        let second = vm.automation().open_viewport().await.unwrap();
        vm.automation().focus_viewport(&second).await.unwrap();

        vm.with_ephemeral("https://site/", |auto| {
            Box::pin(async move {
                auto.vanish(second);
                Ok::<_, anyhow::Error>(())
            })
        })
        .await
        .unwrap();

        assert_eq!(vm.automation().focused(), Some(1));
    }

    #[tokio::test]
    async fn focus_falls_back_to_any_survivor() {
        let mut vm = manager().await;
        let survivor = vm.automation().open_viewport().await.unwrap();
        vm.automation().focus_viewport(&1).await.unwrap();

        vm.with_ephemeral("https://site/", |auto| {
            Box::pin(async move {
                // Prior and main both die; only the untracked one survives
                auto.vanish(1);
                Ok::<_, anyhow::Error>(())
            })
        })
        .await
        .unwrap();

        assert_eq!(vm.automation().focused(), Some(survivor));
    }

    #[tokio::test]
    async fn ensure_main_keeps_a_live_main() {
        let mut vm = manager().await;
        assert_eq!(vm.ensure_main().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ensure_main_promotes_extension_status_first() {
        let mut vm = manager().await;
        let ext = vm.automation().open_viewport().await.unwrap();
        vm.adopt(Role::ExtensionStatus, ext);

        vm.automation().vanish(1);

        assert_eq!(vm.ensure_main().await.unwrap(), ext);
        assert_eq!(vm.handle(Role::Main), Some(&ext));
        // The promoted viewport changed role; it is no longer tracked as
        // the extension-status viewport
        assert_eq!(vm.handle(Role::ExtensionStatus), None);
    }

    #[tokio::test]
    async fn ensure_main_promotes_any_survivor_otherwise() {
        let mut vm = manager().await;
        let survivor = vm.automation().open_viewport().await.unwrap();

        vm.automation().vanish(1);

        assert_eq!(vm.ensure_main().await.unwrap(), survivor);
    }

    #[tokio::test]
    async fn ensure_main_is_fatal_with_no_survivors() {
        let mut vm = manager().await;
        vm.automation().vanish_all();

        let err = vm.ensure_main().await.unwrap_err();
        assert!(KeeperError::is_viewport_loss(&err));
    }

    #[tokio::test]
    async fn live_handle_drops_stale_entries() {
        let mut vm = manager().await;
        let ext = vm.automation().open_viewport().await.unwrap();
        vm.adopt(Role::ExtensionStatus, ext);

        vm.automation().vanish(ext);

        assert_eq!(vm.live_handle(Role::ExtensionStatus).await, None);
        assert_eq!(vm.handle(Role::ExtensionStatus), None);
    }

    #[tokio::test]
    async fn close_all_but_main_clears_strays() {
        let mut vm = manager().await;
        let a = vm.automation().open_viewport().await.unwrap();
        let b = vm.automation().open_viewport().await.unwrap();
        vm.adopt(Role::ExtensionStatus, b);
        vm.automation().focus_viewport(&a).await.unwrap();

        vm.close_all_but_main().await.unwrap();

        assert_eq!(vm.automation().live(), vec![1]);
        assert_eq!(vm.automation().focused(), Some(1));
        assert_eq!(vm.handle(Role::ExtensionStatus), None);
    }
}
