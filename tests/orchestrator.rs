mod common;

#[cfg(test)]
mod tests {
    use super::common::{metadata_body, populate, snapshot, write_tar_gz, FakeProcess, FakeTransport, FaultyOps, ServedStream};
    use chrono::Utc;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::Ordering;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use test_context::{test_context, AsyncTestContext};
    use upkit::libs::error::UpdateError;
    use upkit::libs::fs_ops::FileOps;
    use upkit::libs::locator::{ArtifactLocator, AssetQuery};
    use upkit::libs::orchestrator::{CheckOutcome, InstallReport, Orchestrator, Phase, StartupNotice, UpdateSettings};
    use upkit::libs::release::{Channel, DownloadSource, UpdateType};
    use upkit::libs::state::{PendingUpdate, UpdateComplete};

    const PRIMARY: &str = "https://primary.example/api";
    const PRIMARY_URL: &str = "https://primary.example/api/resources/app/latest";
    const REPO: &str = "https://github.com/owner/app";
    const RELEASES: &str = "https://api.github.com/repos/owner/app/releases";
    const PROXY: &str = "http://proxy.local:3128";

    struct OrchestratorContext {
        temp_dir: TempDir,
        process: Arc<FakeProcess>,
    }

    impl AsyncTestContext for OrchestratorContext {
        async fn setup() -> Self {
            let ctx = OrchestratorContext {
                temp_dir: tempfile::tempdir().unwrap(),
                process: Arc::new(FakeProcess::default()),
            };
            populate(&ctx.path("app"), &[("app.bin", "v1 binary"), ("data/config.ini", "user=1")]);
            ctx
        }
    }

    impl OrchestratorContext {
        fn path(&self, rel: &str) -> PathBuf {
            self.temp_dir.path().join(rel)
        }

        fn settings(&self, current_version: &str) -> UpdateSettings {
            UpdateSettings {
                resource_id: "app".into(),
                current_version: current_version.into(),
                channel: Channel::Stable,
                credential: Some("secret-key".into()),
                user_agent: "upkit-test".into(),
                endpoints: vec![PRIMARY.into()],
                repository_url: Some(REPO.into()),
                project_name: Some("App".into()),
                short_name: Some("App".into()),
                proxy: Some(PROXY.into()),
                install_dir: self.path("app"),
                download_dir: self.path("downloads"),
                retention_dir: self.path("retained"),
                state_dir: self.path("state"),
                relaunch: true,
            }
        }

        fn orchestrator(&self, current_version: &str, transport: Arc<FakeTransport>) -> Orchestrator {
            Orchestrator::new(self.settings(current_version), transport, self.process.clone()).with_locator(
                ArtifactLocator::new(
                    Arc::new(FakeTransport::new()),
                    AssetQuery {
                        os: "win".into(),
                        arch: "x86_64".into(),
                        short_name: Some("App".into()),
                    },
                ),
            )
        }

        fn windows_locator(&self, transport: Arc<FakeTransport>) -> ArtifactLocator {
            ArtifactLocator::new(
                transport,
                AssetQuery {
                    os: "win".into(),
                    arch: "x86_64".into(),
                    short_name: Some("App".into()),
                },
            )
        }

        /// Bytes of a full package replacing `app.bin`.
        fn package(&self) -> Vec<u8> {
            let path = self.path("package.tar.gz");
            write_tar_gz(&path, &[("app.bin", b"v2 binary"), ("lib/new.dll", b"v2 lib")]);
            fs::read(path).unwrap()
        }

        fn pending(&self, file_name: &str, content: &[u8]) -> PendingUpdate {
            let artifact = self.path("downloads").join(file_name);
            fs::create_dir_all(artifact.parent().unwrap()).unwrap();
            fs::write(&artifact, content).unwrap();
            PendingUpdate {
                version_name: "2.0.0".into(),
                release_note: "New features".into(),
                channel: Channel::Stable,
                downloaded_artifact_path: artifact,
                file_size: Some(content.len() as u64),
                update_type: None,
                download_source: DownloadSource::Primary,
                timestamp: Utc::now(),
            }
        }
    }

    fn releases_json() -> String {
        serde_json::json!([{
            "tag_name": "v2.0.0",
            "name": "2.0.0",
            "body": "",
            "prerelease": false,
            "assets": [
                { "name": "App-win-x86_64-v2.0.0.tar.gz", "size": 4096, "browser_download_url": "https://dl.example/app-2.0.0.tar.gz" }
            ]
        }])
        .to_string()
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_development_build_never_checks(ctx: &mut OrchestratorContext) {
        let transport = Arc::new(FakeTransport::new());
        let outcome = ctx.orchestrator("0.9.0", transport.clone()).check_and_prepare().await.unwrap();

        assert_eq!(outcome, CheckOutcome::Suppressed);
        assert!(transport.requested_urls().is_empty());
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_unreachable_endpoints_fail_the_check(ctx: &mut OrchestratorContext) {
        let orchestrator = ctx.orchestrator("1.5.0", Arc::new(FakeTransport::new()));
        let result = orchestrator.check_and_prepare().await;

        assert!(matches!(result, Err(UpdateError::CheckFailed { .. })));
        assert!(orchestrator.state().last_check().is_none());
        assert!(orchestrator.last_release().is_none());
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_up_to_date_records_check_time(ctx: &mut OrchestratorContext) {
        let transport = Arc::new(FakeTransport::new().text(PRIMARY_URL, 200, &metadata_body(0, "success", Some("1.5.0"), None)));
        let orchestrator = ctx.orchestrator("1.5.0", transport);

        let outcome = orchestrator.check_and_prepare().await.unwrap();
        assert!(matches!(outcome, CheckOutcome::UpToDate(_)));
        assert!(orchestrator.state().last_check().is_some());
        assert!(!orchestrator.state().is_check_due(Utc::now()));
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_refusal_is_surfaced_without_public_lookup(ctx: &mut OrchestratorContext) {
        let transport = Arc::new(
            FakeTransport::new()
                .text(PRIMARY_URL, 403, &metadata_body(7001, "key expired", Some("2.0.0"), None))
                .text(RELEASES, 200, &releases_json()),
        );
        let orchestrator = ctx
            .orchestrator("1.5.0", transport.clone())
            .with_locator(ctx.windows_locator(transport.clone()));

        let outcome = orchestrator.check_and_prepare().await.unwrap();
        let release = match outcome {
            CheckOutcome::NotEntitled(release) => release,
            other => panic!("expected refusal, got {:?}", other),
        };
        assert_eq!(release.error_code, Some(7001));
        assert_eq!(transport.requested_urls(), vec![PRIMARY_URL.to_string()]);

        match orchestrator.start_download(&release) {
            Err(UpdateError::NoEntitlement { code, message }) => {
                assert_eq!(code, 7001);
                assert_eq!(message, "key expired");
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("a refused release must not download"),
        }
        assert!(transport.stream_requests.lock().unwrap().is_empty());
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_unlinked_release_downloads_through_proxy_and_installs(ctx: &mut OrchestratorContext) {
        let transport = Arc::new(
            FakeTransport::new()
                .text(PRIMARY_URL, 200, &metadata_body(0, "success", Some("v2.0.0"), None))
                .text(RELEASES, 200, &releases_json())
                .stream("https://dl.example/app-2.0.0.tar.gz", ServedStream::new(ctx.package())),
        );
        let orchestrator = ctx
            .orchestrator("1.5.0", transport.clone())
            .with_locator(ctx.windows_locator(transport.clone()));

        let release = match orchestrator.check_and_prepare().await.unwrap() {
            CheckOutcome::Available(release) => release,
            other => panic!("expected located artifact, got {:?}", other),
        };
        assert_eq!(release.download_source, DownloadSource::Secondary);
        assert_eq!(release.file_size, Some(4096));
        assert_eq!(orchestrator.last_release(), Some(release.clone()));

        let download = orchestrator.start_download(&release).unwrap();
        assert_eq!(orchestrator.phase(), Phase::Downloading(download.session_id()));
        let pending = download.wait().await.unwrap();
        assert_eq!(orchestrator.phase(), Phase::Idle);

        let requests = transport.stream_requests.lock().unwrap().clone();
        assert_eq!(requests, vec![("https://dl.example/app-2.0.0.tar.gz".to_string(), Some(PROXY.to_string()))]);
        // the served name wins over the asset name the request was saved under
        assert_eq!(pending.downloaded_artifact_path, ctx.path("downloads").join("app-2.0.0.tar.gz"));
        assert_eq!(orchestrator.state().load_pending(), Some(pending.clone()));

        let report = orchestrator.install_now(&pending).await.unwrap();
        assert_eq!(
            report,
            InstallReport::Installed {
                mode: UpdateType::Full,
                relaunched: true
            }
        );
        assert_eq!(fs::read_to_string(ctx.path("app/app.bin")).unwrap(), "v2 binary");
        assert_eq!(fs::read_to_string(ctx.path("app/data/config.ini")).unwrap(), "user=1");
        assert_eq!(ctx.process.relaunches.load(Ordering::SeqCst), 1);
        assert!(orchestrator.state().load_pending().is_none());

        match orchestrator.startup() {
            Some(StartupNotice::Completed(complete)) => {
                assert_eq!(complete.previous_version, "1.5.0");
                assert_eq!(complete.new_version, "v2.0.0");
                assert!(!complete.requires_version_verification);
            }
            other => panic!("expected completion notice, got {:?}", other),
        }
        assert!(orchestrator.startup().is_none());
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_licensed_link_skips_proxy(ctx: &mut OrchestratorContext) {
        let url = "https://cdn.example/app-2.0.0.tar.gz";
        let transport = Arc::new(
            FakeTransport::new()
                .text(PRIMARY_URL, 200, &metadata_body(0, "success", Some("2.0.0"), Some(url)))
                .stream(url, ServedStream::new(ctx.package())),
        );
        let orchestrator = ctx.orchestrator("1.5.0", transport.clone());

        let release = orchestrator.check_and_prepare().await.unwrap().release().cloned().unwrap();
        assert_eq!(release.download_source, DownloadSource::Primary);
        orchestrator.start_download(&release).unwrap().wait().await.unwrap();

        let requests = transport.stream_requests.lock().unwrap().clone();
        assert_eq!(requests, vec![(url.to_string(), None)]);
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_platform_installer_is_handed_off(ctx: &mut OrchestratorContext) {
        let before = snapshot(&ctx.path("app"));
        let orchestrator = ctx.orchestrator("1.5.0", Arc::new(FakeTransport::new()));
        let pending = ctx.pending("App-Setup-2.0.0.exe", b"MZ");
        orchestrator.state().save_pending(&pending).unwrap();

        let report = orchestrator.install_now(&pending).await.unwrap();

        assert_eq!(report, InstallReport::InstallerLaunched { pid: 4242 });
        assert_eq!(
            ctx.process.installers.lock().unwrap().clone(),
            vec![pending.downloaded_artifact_path.clone()]
        );
        assert_eq!(snapshot(&ctx.path("app")), before);
        assert_eq!(ctx.process.relaunches.load(Ordering::SeqCst), 0);

        // the installer has not replaced the running version yet
        match orchestrator.startup() {
            Some(StartupNotice::InstallerUnconfirmed(complete)) => assert!(complete.requires_version_verification),
            other => panic!("expected unconfirmed installer, got {:?}", other),
        }
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_verified_installer_reports_completion(ctx: &mut OrchestratorContext) {
        let orchestrator = ctx.orchestrator("2.0.0", Arc::new(FakeTransport::new()));
        orchestrator
            .state()
            .save_complete(&UpdateComplete {
                previous_version: "1.5.0".into(),
                new_version: "2.0.0".into(),
                release_note: String::new(),
                channel: Channel::Stable,
                timestamp: Utc::now(),
                requires_version_verification: true,
            })
            .unwrap();

        assert!(matches!(orchestrator.startup(), Some(StartupNotice::Completed(_))));
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_startup_offers_pending_install(ctx: &mut OrchestratorContext) {
        let orchestrator = ctx.orchestrator("1.5.0", Arc::new(FakeTransport::new()));
        let pending = ctx.pending("app-2.0.0.tar.gz", &ctx.package());
        orchestrator.state().save_pending(&pending).unwrap();

        assert_eq!(orchestrator.startup(), Some(StartupNotice::PendingInstall(pending.clone())));

        fs::remove_file(&pending.downloaded_artifact_path).unwrap();
        assert!(orchestrator.startup().is_none());
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_apply_failure_installs_side_by_side(ctx: &mut OrchestratorContext) {
        let before = snapshot(&ctx.path("app"));
        let orchestrator = Orchestrator::with_file_ops(
            ctx.settings("1.5.0"),
            Arc::new(FakeTransport::new()),
            ctx.process.clone(),
            Arc::new(FaultyOps::new(ctx.path("app"), 2)),
        );
        let pending = ctx.pending("app-2.0.0.tar.gz", &ctx.package());

        let report = orchestrator.install_now(&pending).await.unwrap();

        match report {
            InstallReport::FallbackRecovered { path, cause } => {
                assert_eq!(path, ctx.path("app-2.0.0"));
                assert!(cause.contains("disk full"));
            }
            other => panic!("expected side-by-side install, got {:?}", other),
        }
        assert_eq!(snapshot(&ctx.path("app")), before);
        assert_eq!(fs::read_to_string(ctx.path("app-2.0.0/app.bin")).unwrap(), "v2 binary");
        assert_eq!(ctx.process.relaunches.load(Ordering::SeqCst), 0);
        assert!(orchestrator.startup().is_none());
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_corrupt_artifact_keeps_installation(ctx: &mut OrchestratorContext) {
        let before = snapshot(&ctx.path("app"));
        let orchestrator = ctx.orchestrator("1.5.0", Arc::new(FakeTransport::new()));
        let pending = ctx.pending("app-2.0.0.zip", b"not an archive");

        let result = orchestrator.install_now(&pending).await;

        assert!(matches!(result, Err(UpdateError::ExtractFailed { .. })));
        assert_eq!(snapshot(&ctx.path("app")), before);
        assert!(pending.downloaded_artifact_path.exists());
        assert_eq!(orchestrator.phase(), Phase::Idle);
    }

    /// Holds the first copy into `guarded` until the test releases it.
    struct GatedOps {
        guarded: PathBuf,
        entered: Mutex<Option<Sender<()>>>,
        release: Mutex<Receiver<()>>,
    }

    impl FileOps for GatedOps {
        fn copy_file(&self, src: &Path, dst: &Path) -> std::io::Result<()> {
            if dst.starts_with(&self.guarded) {
                if let Some(entered) = self.entered.lock().unwrap().take() {
                    entered.send(()).unwrap();
                    self.release.lock().unwrap().recv().unwrap();
                }
            }
            fs::copy(src, dst).map(|_| ())
        }
    }

    #[test_context(OrchestratorContext)]
    #[tokio::test]
    async fn test_second_install_while_installing_is_busy(ctx: &mut OrchestratorContext) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let orchestrator = Arc::new(Orchestrator::with_file_ops(
            ctx.settings("1.5.0"),
            Arc::new(FakeTransport::new()),
            ctx.process.clone(),
            Arc::new(GatedOps {
                guarded: ctx.path("app"),
                entered: Mutex::new(Some(entered_tx)),
                release: Mutex::new(release_rx),
            }),
        ));
        let pending = ctx.pending("app-2.0.0.tar.gz", &ctx.package());

        let first = {
            let orchestrator = orchestrator.clone();
            let pending = pending.clone();
            tokio::spawn(async move { orchestrator.install_now(&pending).await })
        };
        tokio::task::spawn_blocking(move || entered_rx.recv()).await.unwrap().unwrap();

        let second = orchestrator.install_now(&pending).await;
        assert!(matches!(second, Err(UpdateError::InstallBusy)), "got {:?}", second);

        release_tx.send(()).unwrap();
        let report = first.await.unwrap().unwrap();
        assert_eq!(
            report,
            InstallReport::Installed {
                mode: UpdateType::Full,
                relaunched: true
            }
        );
        assert_eq!(fs::read_to_string(ctx.path("app/app.bin")).unwrap(), "v2 binary");

        // the lease is released once the first install finishes
        let again = orchestrator.install_now(&pending).await;
        assert!(!matches!(again, Err(UpdateError::InstallBusy)));
    }
}
