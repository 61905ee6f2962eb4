//! Techem provider client: login plus the tenant-table and KPI queries.

use chrono::{Local, NaiveDate};
use serde::de::DeserializeOwned;

use crate::api::kpi::KpiData;
use crate::api::tenant_table::TenantTableData;
use crate::api::{ConsumptionRow, KpiInput, KpiSnapshot, PeriodKind, TenantTableInput};
use crate::auth::{AuthToken, Authenticator, TokenPolicy};
use crate::config::{Config, CountryEndpoint, Credentials};
use crate::error::{ApiError, AuthError, ConfigError};
use crate::graphql::{GraphQlClient, GraphQlRequest};

/// Default distance from today to the end of a period.
pub const DEFAULT_DAY_OFFSET: u32 = 1;

/// Default length of the KPI window.
pub const DEFAULT_KPI_DAYS_BACK: u32 = 30;

/// Client for one tenant unit at one country endpoint.
#[derive(Clone)]
pub struct ProviderClient {
    graphql: GraphQlClient,
    auth: Authenticator,
    object_id: String,
}

impl ProviderClient {
    /// Create a new provider client.
    ///
    /// # Errors
    /// Returns `ApiError::HttpClientInit` if the HTTP client cannot be created.
    pub fn new(
        credentials: Credentials,
        endpoint: CountryEndpoint,
        timeout: std::time::Duration,
        policy: TokenPolicy,
    ) -> Result<Self, ApiError> {
        let graphql = GraphQlClient::new(endpoint, timeout)?;
        let object_id = credentials.object_id.clone();
        let auth = Authenticator::new(graphql.clone(), credentials, policy);

        Ok(Self {
            graphql,
            auth,
            object_id,
        })
    }

    /// Create a client from a validated config.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let policy = TokenPolicy {
            cache: config.cache_token,
            ttl: config.token_ttl(),
            buffer: config.token_buffer(),
        };

        Self::new(
            config.credentials(),
            config.endpoint()?,
            config.timeout(),
            policy,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Log in and return the token.
    pub async fn authenticate(&self) -> Result<AuthToken, AuthError> {
        self.auth.login().await
    }

    /// First tenant-table row for `kind`, or `None` on any failure.
    pub async fn fetch_period_row(
        &self,
        kind: PeriodKind,
        day_offset: u32,
    ) -> Option<ConsumptionRow> {
        match self.try_fetch_period_row(kind, day_offset).await {
            Ok(row) => {
                tracing::debug!(period = kind.as_str(), "Successfully retrieved data");
                Some(row)
            }
            Err(e) => {
                tracing::error!(period = kind.as_str(), error = %e, "Failed to get data");
                None
            }
        }
    }

    /// KPI snapshot for the last `days_back` days, or `None` on any failure.
    pub async fn fetch_kpi_snapshot(&self, days_back: u32) -> Option<KpiSnapshot> {
        match self.try_fetch_kpi_snapshot(days_back).await {
            Ok(snapshot) => {
                tracing::debug!("Successfully retrieved KPI data");
                Some(snapshot)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to get KPI data");
                None
            }
        }
    }

    /// Same as [`fetch_period_row`](Self::fetch_period_row) with the cause of failure.
    pub async fn try_fetch_period_row(
        &self,
        kind: PeriodKind,
        day_offset: u32,
    ) -> Result<ConsumptionRow, ApiError> {
        let input = TenantTableInput::for_period(kind, &self.object_id, today(), day_offset)?;
        let data: TenantTableData = self.query(&input.to_request()).await?;
        data.first_row().ok_or(ApiError::MissingData("tenantTable.rows"))
    }

    /// Same as [`fetch_kpi_snapshot`](Self::fetch_kpi_snapshot) with the cause of failure.
    pub async fn try_fetch_kpi_snapshot(&self, days_back: u32) -> Result<KpiSnapshot, ApiError> {
        let input = KpiInput::last_days(&self.object_id, today(), days_back)?;
        let data: KpiData = self.query(&input.to_request()).await?;
        data.unit_quantity_kpis
            .ok_or(ApiError::MissingData("unitQuantityKpis"))
    }

    /// Run an authenticated query.
    ///
    /// A cached token that fails with 401/403 or with GraphQL errors is
    /// dropped and the query is retried once after a fresh login.
    async fn query<T: DeserializeOwned>(&self, request: &GraphQlRequest) -> Result<T, ApiError> {
        let (token, from_cache) = self.auth.get_token().await?;

        match self.graphql.execute(request, token.as_str()).await {
            Err(e) if from_cache && e.may_be_stale_token() => {
                tracing::debug!(error = %e, "Cached token rejected, logging in again");
                self.auth.invalidate().await;
                let (token, _) = self.auth.get_token().await?;
                self.graphql.execute(request, token.as_str()).await
            }
            result => result,
        }
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("url", &self.graphql.endpoint().url)
            .field("object_id", &self.object_id)
            .finish()
    }
}

/// Local calendar date.
fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration};
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn client(server: &ServerGuard, policy: TokenPolicy) -> ProviderClient {
        let endpoint = CountryEndpoint {
            name: "Test".to_string(),
            url: format!("{}/analytics/graphql", server.url()),
            referer: "https://beboer.example.dk/".to_string(),
        };
        let credentials = Credentials {
            email: "tenant@example.dk".to_string(),
            password: "secret".to_string(),
            object_id: "unit-1".to_string(),
        };
        ProviderClient::new(
            credentials,
            endpoint,
            std::time::Duration::from_secs(10),
            policy,
        )
        .unwrap()
    }

    fn login_matcher() -> Matcher {
        Matcher::Regex("loginWithEmailAndPassword".to_string())
    }

    fn tenant_table_matcher() -> Matcher {
        Matcher::PartialJson(json!({"operationName": "TenantTable"}))
    }

    fn kpi_matcher() -> Matcher {
        Matcher::PartialJson(json!({"operationName": "UnitQuantityKPIs"}))
    }

    async fn mock_login(server: &mut ServerGuard, token: &str) -> mockito::Mock {
        server
            .mock("POST", "/analytics/graphql")
            .match_body(login_matcher())
            .with_status(200)
            .with_body(
                json!({"data": {"loginWithEmailAndPassword": {"ok": {"token": token}}}})
                    .to_string(),
            )
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_fetch_yearly_row() {
        let mut server = Server::new_async().await;
        let login = mock_login(&mut server, "tok").await;

        let today = Local::now().date_naive();
        let expected_begin = format!("{}-01-01T00:00:00", today.year());
        let expected_end = (today - Duration::days(1))
            .format("%Y-%m-%dT00:00:00")
            .to_string();

        let query = server
            .mock("POST", "/analytics/graphql")
            .match_header("authorization", "JWT tok")
            .match_header("origin", "https://beboer.example.dk")
            .match_body(Matcher::PartialJson(json!({
                "operationName": "TenantTable",
                "variables": {"table": {
                    "aggregationLevel": "UNIT",
                    "objectId": "unit-1",
                    "periodBegin": expected_begin,
                    "periodEnd": expected_end,
                    "compareWith": "previous-year"
                }}
            })))
            .with_status(200)
            .with_body(
                json!({"data": {"tenantTable": {"rows": [
                    {"values": [1500.0, 30.5], "comparisonValues": [1200.0, 28.0]}
                ]}}})
                .to_string(),
            )
            .create_async()
            .await;

        let client = client(&server, TokenPolicy::default());
        let row = client
            .fetch_period_row(PeriodKind::Yearly, DEFAULT_DAY_OFFSET)
            .await
            .unwrap();

        assert_eq!(row.values, vec![Some(1500.0), Some(30.5)]);
        assert_eq!(row.comparison_values, vec![Some(1200.0), Some(28.0)]);
        login.assert_async().await;
        query.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_weekly_row_variables() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server, "tok").await;

        let today = Local::now().date_naive();
        let expected_begin = (today - Duration::days(8))
            .format("%Y-%m-%dT00:00:00")
            .to_string();

        let query = server
            .mock("POST", "/analytics/graphql")
            .match_body(Matcher::PartialJson(json!({
                "variables": {"table": {
                    "periodBegin": expected_begin,
                    "compareWith": "previous-period"
                }}
            })))
            .with_status(200)
            .with_body(
                json!({"data": {"tenantTable": {"rows": [
                    {"values": [70.0, 0.21], "comparisonValues": [60.0, 0.2]}
                ]}}})
                .to_string(),
            )
            .create_async()
            .await;

        let client = client(&server, TokenPolicy::default());
        assert!(client
            .fetch_period_row(PeriodKind::Weekly, DEFAULT_DAY_OFFSET)
            .await
            .is_some());
        query.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_rows_yield_none() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server, "tok").await;
        let _query = server
            .mock("POST", "/analytics/graphql")
            .match_body(tenant_table_matcher())
            .with_status(200)
            .with_body(json!({"data": {"tenantTable": {"rows": []}}}).to_string())
            .create_async()
            .await;

        let client = client(&server, TokenPolicy::default());
        assert!(client
            .fetch_period_row(PeriodKind::Weekly, DEFAULT_DAY_OFFSET)
            .await
            .is_none());
        assert!(matches!(
            client.try_fetch_period_row(PeriodKind::Weekly, 1).await,
            Err(ApiError::MissingData("tenantTable.rows"))
        ));
    }

    #[tokio::test]
    async fn test_login_failure_yields_none_without_querying() {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/analytics/graphql")
            .match_body(login_matcher())
            .with_status(503)
            .create_async()
            .await;
        let query = server
            .mock("POST", "/analytics/graphql")
            .match_body(tenant_table_matcher())
            .expect(0)
            .create_async()
            .await;
        let kpi = server
            .mock("POST", "/analytics/graphql")
            .match_body(kpi_matcher())
            .expect(0)
            .create_async()
            .await;

        let client = client(&server, TokenPolicy::default());
        assert!(client
            .fetch_period_row(PeriodKind::Yearly, DEFAULT_DAY_OFFSET)
            .await
            .is_none());
        assert!(client
            .fetch_kpi_snapshot(DEFAULT_KPI_DAYS_BACK)
            .await
            .is_none());
        query.assert_async().await;
        kpi.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_token_yields_none() {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/analytics/graphql")
            .match_body(login_matcher())
            .with_status(200)
            .with_body(json!({"data": {"loginWithEmailAndPassword": {"ok": null}}}).to_string())
            .create_async()
            .await;

        let client = client(&server, TokenPolicy::default());
        assert!(client.authenticate().await.is_err());
        assert!(client
            .fetch_kpi_snapshot(DEFAULT_KPI_DAYS_BACK)
            .await
            .is_none());
        assert!(matches!(
            client.try_fetch_kpi_snapshot(DEFAULT_KPI_DAYS_BACK).await,
            Err(ApiError::Auth(AuthError::MissingToken))
        ));
    }

    #[tokio::test]
    async fn test_query_http_error_yields_none() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server, "tok").await;
        let _query = server
            .mock("POST", "/analytics/graphql")
            .match_body(tenant_table_matcher())
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let client = client(&server, TokenPolicy::default());
        assert!(client
            .fetch_period_row(PeriodKind::Yearly, DEFAULT_DAY_OFFSET)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_malformed_query_response_yields_none() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server, "tok").await;
        let _query = server
            .mock("POST", "/analytics/graphql")
            .match_body(kpi_matcher())
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let client = client(&server, TokenPolicy::default());
        assert!(client
            .fetch_kpi_snapshot(DEFAULT_KPI_DAYS_BACK)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_fetch_kpi_snapshot() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server, "tok").await;

        let today = Local::now().date_naive();
        let expected_begin = (today - Duration::days(30)).format("%Y-%m-%d").to_string();
        let expected_end = (today - Duration::days(1)).format("%Y-%m-%d").to_string();

        let query = server
            .mock("POST", "/analytics/graphql")
            .match_header("authorization", "JWT tok")
            .match_body(Matcher::PartialJson(json!({
                "operationName": "UnitQuantityKPIs",
                "variables": {"input": {
                    "objectId": "unit-1",
                    "quantity": "hca",
                    "periodBegin": expected_begin,
                    "periodEnd": expected_end
                }}
            })))
            .with_status(200)
            .with_body(
                json!({"data": {"unitQuantityKpis": {
                    "total": 120.0,
                    "previousPeriod": 110.0,
                    "previousYear": 100.0,
                    "propertyComparison": 150.0,
                    "rooms": [{"label": "Living room", "value": 80.0}],
                    "meters": []
                }}})
                .to_string(),
            )
            .create_async()
            .await;

        let client = client(&server, TokenPolicy::default());
        let snapshot = client
            .fetch_kpi_snapshot(DEFAULT_KPI_DAYS_BACK)
            .await
            .unwrap();

        assert_eq!(snapshot.total, Some(120.0));
        assert_eq!(snapshot.rooms.len(), 1);
        query.assert_async().await;
    }

    #[tokio::test]
    async fn test_each_fetch_logs_in_again() {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/analytics/graphql")
            .match_body(login_matcher())
            .with_status(200)
            .with_body(
                json!({"data": {"loginWithEmailAndPassword": {"ok": {"token": "tok"}}}})
                    .to_string(),
            )
            .expect(2)
            .create_async()
            .await;
        let _query = server
            .mock("POST", "/analytics/graphql")
            .match_body(tenant_table_matcher())
            .with_status(200)
            .with_body(
                json!({"data": {"tenantTable": {"rows": [{"values": [1.0, 2.0], "comparisonValues": [1.0, 2.0]}]}}})
                    .to_string(),
            )
            .expect(2)
            .create_async()
            .await;

        let client = client(&server, TokenPolicy::default());
        client.fetch_period_row(PeriodKind::Yearly, 1).await.unwrap();
        client.fetch_period_row(PeriodKind::Weekly, 1).await.unwrap();
        login.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_cached_token_triggers_fresh_login() {
        let mut server = Server::new_async().await;
        let login = mock_login(&mut server, "fresh").await;
        let rejected = server
            .mock("POST", "/analytics/graphql")
            .match_header("authorization", "JWT stale")
            .match_body(kpi_matcher())
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", "/analytics/graphql")
            .match_header("authorization", "JWT fresh")
            .match_body(kpi_matcher())
            .with_status(200)
            .with_body(json!({"data": {"unitQuantityKpis": {"total": 5.0}}}).to_string())
            .expect(1)
            .create_async()
            .await;

        let policy = TokenPolicy {
            cache: true,
            ..TokenPolicy::default()
        };
        let client = client(&server, policy);
        client
            .auth
            .seed_cache(AuthToken::new("stale"), chrono::Utc::now() + Duration::hours(1))
            .await;

        let snapshot = client
            .fetch_kpi_snapshot(DEFAULT_KPI_DAYS_BACK)
            .await
            .unwrap();

        assert_eq!(snapshot.total, Some(5.0));
        login.assert_async().await;
        rejected.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_graphql_error_on_cached_token_triggers_fresh_login() {
        let mut server = Server::new_async().await;
        let login = mock_login(&mut server, "fresh").await;
        let rejected = server
            .mock("POST", "/analytics/graphql")
            .match_header("authorization", "JWT revoked")
            .match_body(tenant_table_matcher())
            .with_status(200)
            .with_body(
                json!({"data": null, "errors": [{"message": "Signature has expired"}]}).to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", "/analytics/graphql")
            .match_header("authorization", "JWT fresh")
            .match_body(tenant_table_matcher())
            .with_status(200)
            .with_body(
                json!({"data": {"tenantTable": {"rows": [{"values": [7.0, 0.5]}]}}}).to_string(),
            )
            .expect(2)
            .create_async()
            .await;

        let policy = TokenPolicy {
            cache: true,
            ..TokenPolicy::default()
        };
        let client = client(&server, policy);
        client
            .auth
            .seed_cache(AuthToken::new("revoked"), chrono::Utc::now() + Duration::hours(1))
            .await;

        let row = client
            .fetch_period_row(PeriodKind::Weekly, DEFAULT_DAY_OFFSET)
            .await
            .unwrap();
        assert_eq!(row.values, vec![Some(7.0), Some(0.5)]);

        // the fresh token replaced the revoked one in the cache
        client
            .fetch_period_row(PeriodKind::Weekly, DEFAULT_DAY_OFFSET)
            .await
            .unwrap();

        login.assert_async().await;
        rejected.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_huge_offsets_yield_none_without_requests() {
        let mut server = Server::new_async().await;
        let any = server
            .mock("POST", "/analytics/graphql")
            .expect(0)
            .create_async()
            .await;

        let client = client(&server, TokenPolicy::default());

        assert!(client
            .fetch_period_row(PeriodKind::Weekly, u32::MAX)
            .await
            .is_none());
        assert!(client.fetch_kpi_snapshot(u32::MAX).await.is_none());
        assert!(matches!(
            client.try_fetch_period_row(PeriodKind::Yearly, u32::MAX).await,
            Err(ApiError::DateOutOfRange(u32::MAX))
        ));
        any.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_with_cached_token_is_not_retried() {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/analytics/graphql")
            .match_body(login_matcher())
            .expect(0)
            .create_async()
            .await;
        let query = server
            .mock("POST", "/analytics/graphql")
            .match_body(tenant_table_matcher())
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let policy = TokenPolicy {
            cache: true,
            ..TokenPolicy::default()
        };
        let client = client(&server, policy);
        client
            .auth
            .seed_cache(AuthToken::new("cached"), chrono::Utc::now() + Duration::hours(1))
            .await;

        assert!(client
            .fetch_period_row(PeriodKind::Yearly, DEFAULT_DAY_OFFSET)
            .await
            .is_none());
        login.assert_async().await;
        query.assert_async().await;
    }
}
