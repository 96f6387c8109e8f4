mod common;

#[cfg(test)]
mod tests {
    use super::common::{metadata_body, FakeTransport};
    use std::sync::Arc;
    use test_context::{test_context, AsyncTestContext};
    use upkit::libs::release::{Channel, DownloadSource, ReleaseStatus};
    use upkit::libs::resolver::{CheckRequest, VersionResolver};

    const PRIMARY: &str = "https://primary.example/api";
    const MIRROR: &str = "https://mirror.example/api";
    const PRIMARY_URL: &str = "https://primary.example/api/resources/app/latest";
    const MIRROR_URL: &str = "https://mirror.example/api/resources/app/latest";

    struct ResolverContext {
        request: CheckRequest,
        endpoints: Vec<String>,
    }

    impl AsyncTestContext for ResolverContext {
        async fn setup() -> Self {
            ResolverContext {
                request: CheckRequest {
                    resource_id: "app".into(),
                    current_version: "v1.5.0".into(),
                    credential: Some("secret-key".into()),
                    channel: Channel::Stable,
                    user_agent: "upkit-test".into(),
                },
                endpoints: vec![PRIMARY.to_string(), MIRROR.to_string()],
            }
        }
    }

    impl ResolverContext {
        fn resolver(&self, transport: Arc<FakeTransport>) -> VersionResolver {
            VersionResolver::new(transport, self.endpoints.clone())
        }
    }

    #[test_context(ResolverContext)]
    #[tokio::test]
    async fn test_all_endpoints_unreachable_returns_none(ctx: &mut ResolverContext) {
        let transport = Arc::new(FakeTransport::new());
        let result = ctx.resolver(transport.clone()).check_for_update(&ctx.request).await;

        assert!(result.is_none());
        assert_eq!(transport.requested_urls(), vec![PRIMARY_URL.to_string(), MIRROR_URL.to_string()]);
    }

    #[test_context(ResolverContext)]
    #[tokio::test]
    async fn test_refusal_with_version_reports_code_and_update(ctx: &mut ResolverContext) {
        let transport = Arc::new(FakeTransport::new().text(
            PRIMARY_URL,
            403,
            &metadata_body(7001, "key expired", Some("v1.6.0"), Some("https://cdn.example/app.zip")),
        ));
        let release = ctx
            .resolver(transport)
            .check_for_update(&ctx.request)
            .await
            .expect("a refusal with a version is still a result");

        assert!(release.has_update);
        assert_eq!(release.version_name, "v1.6.0");
        assert_eq!(release.error_code, Some(7001));
        assert_eq!(release.error_message.as_deref(), Some("key expired"));
        assert_eq!(release.download_url, None);
        assert_eq!(
            release.status(),
            ReleaseStatus::NotEntitled {
                code: 7001,
                message: "key expired"
            }
        );
    }

    #[test_context(ResolverContext)]
    #[tokio::test]
    async fn test_refusal_with_older_version_has_no_update(ctx: &mut ResolverContext) {
        let transport = Arc::new(FakeTransport::new().text(
            PRIMARY_URL,
            200,
            &metadata_body(7002, "invalid key", Some("1.4.9"), None),
        ));
        let release = ctx.resolver(transport).check_for_update(&ctx.request).await.unwrap();

        assert!(!release.has_update);
        assert_eq!(release.error_code, Some(7002));
        assert_eq!(release.status(), ReleaseStatus::UpToDate);
    }

    #[test_context(ResolverContext)]
    #[tokio::test]
    async fn test_unreachable_primary_falls_through_to_mirror(ctx: &mut ResolverContext) {
        let transport = Arc::new(FakeTransport::new().text(
            MIRROR_URL,
            200,
            &metadata_body(0, "success", Some("1.6.0"), Some("https://cdn.example/app-1.6.0.zip")),
        ));
        let release = ctx.resolver(transport.clone()).check_for_update(&ctx.request).await.unwrap();

        assert!(release.has_update);
        assert_eq!(release.error_code, None);
        assert_eq!(release.download_source, DownloadSource::Primary);
        assert_eq!(release.download_url.as_deref(), Some("https://cdn.example/app-1.6.0.zip"));
        assert_eq!(transport.requested_urls().len(), 2);
    }

    #[test_context(ResolverContext)]
    #[tokio::test]
    async fn test_success_after_refusal_wins(ctx: &mut ResolverContext) {
        let transport = Arc::new(
            FakeTransport::new()
                .text(PRIMARY_URL, 200, &metadata_body(7001, "key expired", Some("1.6.0"), None))
                .text(
                    MIRROR_URL,
                    200,
                    &metadata_body(0, "success", Some("1.6.0"), Some("https://cdn.example/app.zip")),
                ),
        );
        let release = ctx.resolver(transport).check_for_update(&ctx.request).await.unwrap();

        assert_eq!(release.error_code, None);
        assert!(matches!(release.status(), ReleaseStatus::Downloadable { .. }));
    }

    #[test_context(ResolverContext)]
    #[tokio::test]
    async fn test_first_success_short_circuits(ctx: &mut ResolverContext) {
        let transport = Arc::new(
            FakeTransport::new()
                .text(PRIMARY_URL, 200, &metadata_body(0, "success", Some("1.5.0"), None))
                .text(MIRROR_URL, 200, &metadata_body(0, "success", Some("9.9.9"), None)),
        );
        let release = ctx.resolver(transport.clone()).check_for_update(&ctx.request).await.unwrap();

        assert!(!release.has_update);
        assert_eq!(transport.requested_urls(), vec![PRIMARY_URL.to_string()]);
    }

    #[test_context(ResolverContext)]
    #[tokio::test]
    async fn test_refusal_disclosing_version_is_preferred(ctx: &mut ResolverContext) {
        let transport = Arc::new(
            FakeTransport::new()
                .text(PRIMARY_URL, 200, &metadata_body(8001, "rate limited", None, None))
                .text(MIRROR_URL, 200, &metadata_body(7001, "key expired", Some("2.0.0"), None)),
        );
        let release = ctx.resolver(transport).check_for_update(&ctx.request).await.unwrap();

        assert_eq!(release.error_code, Some(7001));
        assert_eq!(release.version_name, "2.0.0");
        assert!(release.has_update);
    }

    #[test_context(ResolverContext)]
    #[tokio::test]
    async fn test_malformed_body_counts_as_failure(ctx: &mut ResolverContext) {
        let transport = Arc::new(
            FakeTransport::new()
                .text(PRIMARY_URL, 502, "<html>bad gateway</html>")
                .text(MIRROR_URL, 200, &metadata_body(0, "success", Some("1.6.0"), None)),
        );
        let release = ctx.resolver(transport).check_for_update(&ctx.request).await.unwrap();
        assert_eq!(release.version_name, "1.6.0");

        let broken = Arc::new(FakeTransport::new().text(PRIMARY_URL, 502, "<html>bad gateway</html>"));
        assert!(ctx.resolver(broken).check_for_update(&ctx.request).await.is_none());
    }

    #[test_context(ResolverContext)]
    #[tokio::test]
    async fn test_query_carries_credential_and_platform(ctx: &mut ResolverContext) {
        let transport = Arc::new(FakeTransport::new().text(
            PRIMARY_URL,
            200,
            &metadata_body(0, "success", Some("1.5.0"), None),
        ));
        ctx.resolver(transport.clone()).check_for_update(&ctx.request).await.unwrap();

        let requests = transport.text_requests.lock().unwrap();
        let params = &requests[0].1;
        let get = |key: &str| params.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
        assert_eq!(get("cdk").as_deref(), Some("secret-key"));
        assert_eq!(get("current_version").as_deref(), Some("v1.5.0"));
        assert_eq!(get("channel").as_deref(), Some("stable"));
        assert!(get("os").is_some());
        assert!(get("arch").is_some());
    }
}
