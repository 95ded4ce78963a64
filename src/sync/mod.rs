//! Metrics refresh orchestration.
//!
//! `sync_employee` drives one full refresh for one employee: load the token,
//! apply the expiry rule (with a single refresh attempt when stale), fan the
//! six metric calls out, merge only the successful values back, snapshot.
//! `run_manual` is the batch variant over an explicit id or every authorized
//! employee, throttled in small groups with a pause in between.
//!
//! Failure policy: a per-metric or per-employee failure is recorded and the
//! run continues. Nothing escapes past the orchestrator's boundary — callers
//! always get a structured outcome, even for a run where nothing succeeded.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::douyin::{AuthFlow, Metric, MetricsClient};
use crate::error::{Error, Result, UpstreamKind};
use crate::store::sync_records::{SyncStatus, SyncType};
use crate::store::{
    AuthStatus, Employee, EmployeeStore, EmployeeUpdate, MetricCounters, SettingsStore,
    SnapshotStore, SyncRecordStore, TokenStore, VideoStore,
};

/// Result of one employee's refresh.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub employee_id: String,
    /// Metric calls that succeeded this round.
    pub succeeded: usize,
    /// Metric calls that failed; their counters kept their previous values.
    pub failed: usize,
    pub errors: Vec<String>,
    pub synced_at: DateTime<Utc>,
}

/// Result of one batch invocation.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub sync_record_id: i64,
    pub total: usize,
    pub success_count: i64,
    pub failed_count: i64,
    pub errors: Vec<String>,
}

/// Drives metric refreshes; constructed once with its collaborators injected.
pub struct SyncOrchestrator {
    employees: EmployeeStore,
    tokens: TokenStore,
    snapshots: SnapshotStore,
    videos: VideoStore,
    sync_records: SyncRecordStore,
    settings: SettingsStore,
    auth: AuthFlow,
    metrics: MetricsClient,
    config: SyncConfig,
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        employees: EmployeeStore,
        tokens: TokenStore,
        snapshots: SnapshotStore,
        videos: VideoStore,
        sync_records: SyncRecordStore,
        settings: SettingsStore,
        auth: AuthFlow,
        metrics: MetricsClient,
        config: SyncConfig,
    ) -> Self {
        Self {
            employees,
            tokens,
            snapshots,
            videos,
            sync_records,
            settings,
            auth,
            metrics,
            config,
        }
    }

    /// One full refresh for one employee.
    ///
    /// A stale token triggers exactly one refresh-and-retry; a failed
    /// refresh downgrades the employee to `expired` and surfaces a
    /// token-expired error so the operator re-authorizes instead of the
    /// service retrying in a loop.
    pub async fn sync_employee(&self, employee_id: &str) -> Result<SyncOutcome> {
        match self.sync_once(employee_id).await {
            Err(Error::Upstream {
                kind: UpstreamKind::TokenExpired,
                ..
            }) => {
                info!(employee_id = %employee_id, "Access token stale, attempting refresh");
                self.refresh_token(employee_id).await?;
                self.sync_once(employee_id).await
            }
            other => other,
        }
    }

    /// Renew the stored token via the refresh endpoint and persist it.
    async fn refresh_token(&self, employee_id: &str) -> Result<()> {
        let token = self.tokens.get(employee_id)?.ok_or_else(|| {
            Error::not_found(format!("no auth token stored for employee {}", employee_id))
        })?;

        if token.is_refresh_expired(Utc::now()) {
            self.employees
                .set_auth_status(employee_id, AuthStatus::Expired)?;
            return Err(Error::upstream(
                UpstreamKind::TokenExpired,
                "refresh token has expired, re-authorization required",
            ));
        }

        match self.auth.refresh(&token.refresh_token).await {
            Ok(mut grant) => {
                // The platform may omit fields it did not rotate
                if grant.refresh_token.is_empty() {
                    grant.refresh_token = token.refresh_token;
                }
                if grant.open_id.is_empty() {
                    grant.open_id = token.open_id;
                }
                if grant.scope.is_empty() {
                    grant.scope = token.scope;
                }
                // save() flips the employee back to authorized
                self.tokens.save(employee_id, &grant)?;
                info!(employee_id = %employee_id, "Access token refreshed");
                Ok(())
            }
            Err(e) => {
                self.employees
                    .set_auth_status(employee_id, AuthStatus::Expired)?;
                Err(Error::upstream(
                    UpstreamKind::TokenExpired,
                    format!("token refresh failed: {}", e),
                ))
            }
        }
    }

    async fn sync_once(&self, employee_id: &str) -> Result<SyncOutcome> {
        let employee = self.employees.require(employee_id)?;
        let token = self.tokens.get(employee_id)?.ok_or_else(|| {
            Error::not_found(format!("no auth token stored for employee {}", employee_id))
        })?;

        if token.is_expired(Utc::now()) {
            self.employees
                .set_auth_status(employee_id, AuthStatus::Expired)?;
            return Err(Error::upstream(
                UpstreamKind::TokenExpired,
                "stored access token has expired",
            ));
        }

        let report = self
            .metrics
            .fetch_all(&token.open_id, &token.access_token)
            .await;

        let succeeded = report.succeeded();
        let failed = report.failed();
        let errors = report.errors();

        if succeeded == 0 {
            // Nothing fetched: leave counters, last_sync_time and history
            // untouched rather than recording a round of stale values
            warn!(employee_id = %employee_id, "All metric fetches failed");
            return Ok(SyncOutcome {
                employee_id: employee_id.to_string(),
                succeeded,
                failed,
                errors,
                synced_at: Utc::now(),
            });
        }

        // Merge: a failed metric keeps its previous counter value
        let merged = MetricCounters {
            fans_count: report.value(Metric::Fans).unwrap_or(employee.counters.fans_count),
            like_count: report.value(Metric::Likes).unwrap_or(employee.counters.like_count),
            comment_count: report
                .value(Metric::Comments)
                .unwrap_or(employee.counters.comment_count),
            share_count: report
                .value(Metric::Shares)
                .unwrap_or(employee.counters.share_count),
            home_pv: report
                .value(Metric::HomeViews)
                .unwrap_or(employee.counters.home_pv),
            video_count: report
                .value(Metric::VideoStatus)
                .unwrap_or(employee.counters.video_count),
        };

        let now = Utc::now();
        self.employees.update(
            employee_id,
            &EmployeeUpdate {
                fans_count: Some(merged.fans_count),
                like_count: Some(merged.like_count),
                comment_count: Some(merged.comment_count),
                share_count: Some(merged.share_count),
                home_pv: Some(merged.home_pv),
                video_count: Some(merged.video_count),
                last_sync_time: Some(now),
                ..Default::default()
            },
        )?;

        self.snapshots
            .append(employee_id, &merged, now.date_naive())?;

        // Video list is best-effort: a failure here never fails the sync
        match self
            .metrics
            .fetch_video_list(
                &token.open_id,
                &token.access_token,
                self.config.video_page_size,
                0,
            )
            .await
        {
            Ok(page) => {
                let records: Vec<_> = page.list.into_iter().map(|v| v.into_record()).collect();
                if let Err(e) = self.videos.replace_all(employee_id, &records) {
                    warn!(employee_id = %employee_id, error = %e, "Failed to store video list");
                }
            }
            Err(e) => {
                warn!(employee_id = %employee_id, error = %e, "Video list fetch failed");
            }
        }

        info!(
            employee_id = %employee_id,
            succeeded = succeeded,
            failed = failed,
            "Employee sync finished"
        );

        Ok(SyncOutcome {
            employee_id: employee_id.to_string(),
            succeeded,
            failed,
            errors,
            synced_at: now,
        })
    }

    /// Manual sync entry point: one employee when an id is given, otherwise
    /// every employee currently authorized.
    ///
    /// Employees run in groups of `batch_size` with a fixed pause between
    /// groups — a deliberate, non-adaptive throttle against the upstream
    /// rate limit. One employee's failure never aborts the rest.
    pub async fn run_manual(&self, employee_id: Option<&str>) -> Result<BatchOutcome> {
        let targets: Vec<Employee> = match employee_id {
            Some(id) => vec![self.employees.require(id)?],
            None => self.employees.list_authorized()?,
        };

        let record_id = self.sync_records.begin(employee_id, SyncType::Manual)?;
        let outcome = self.run_targets(record_id, targets).await?;

        Ok(outcome)
    }

    async fn run_targets(&self, record_id: i64, targets: Vec<Employee>) -> Result<BatchOutcome> {
        let total = targets.len();
        let mut success_count: i64 = 0;
        let mut failed_count: i64 = 0;
        let mut errors: Vec<String> = Vec::new();

        let mut chunks = targets.chunks(self.config.batch_size.max(1)).peekable();
        while let Some(chunk) = chunks.next() {
            let results = join_all(chunk.iter().map(|employee| async move {
                (employee, self.sync_employee(&employee.id).await)
            }))
            .await;

            for (employee, result) in results {
                match result {
                    Ok(outcome) if outcome.succeeded > 0 => success_count += 1,
                    Ok(outcome) => {
                        // Every metric call failed — count the employee as failed
                        failed_count += 1;
                        errors.push(format!(
                            "{} ({}): {}",
                            employee.name,
                            employee.id,
                            outcome.errors.join(", ")
                        ));
                    }
                    Err(e) => {
                        failed_count += 1;
                        errors.push(format!("{} ({}): {}", employee.name, employee.id, e));
                    }
                }
            }

            if chunks.peek().is_some() {
                tokio::time::sleep(Duration::from_millis(self.config.batch_pause_ms)).await;
            }
        }

        let status = if failed_count == 0 {
            SyncStatus::Success
        } else {
            SyncStatus::Failed
        };
        let message = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };
        self.sync_records.finish(
            record_id,
            status,
            success_count,
            failed_count,
            message.as_deref(),
        )?;

        if success_count > 0 {
            self.settings.touch_last_sync()?;
        }

        info!(
            sync_record_id = record_id,
            total = total,
            success = success_count,
            failed = failed_count,
            "Sync run finished"
        );

        Ok(BatchOutcome {
            sync_record_id: record_id,
            total,
            success_count,
            failed_count,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DouyinConfig;
    use crate::store::{Database, NewEmployee, TokenData};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    struct Fixture {
        employees: EmployeeStore,
        tokens: TokenStore,
        snapshots: SnapshotStore,
        sync_records: SyncRecordStore,
        orchestrator: SyncOrchestrator,
    }

    fn fixture(server_url: &str) -> Fixture {
        let db = Database::open(":memory:").unwrap();
        let key = BASE64.encode([0u8; 32]);

        let employees = EmployeeStore::new(db.clone());
        let tokens = TokenStore::new(db.clone(), &key).unwrap();
        let snapshots = SnapshotStore::new(db.clone());
        let videos = VideoStore::new(db.clone());
        let sync_records = SyncRecordStore::new(db.clone());
        let settings = SettingsStore::new(db);

        let douyin_config = DouyinConfig {
            client_key: "awkey".to_string(),
            client_secret: "shh".to_string(),
            redirect_uri: "https://dash.example.com/auth/callback".to_string(),
            api_base: server_url.to_string(),
            ..Default::default()
        };

        let orchestrator = SyncOrchestrator::new(
            employees.clone(),
            tokens.clone(),
            snapshots.clone(),
            videos,
            sync_records.clone(),
            settings,
            AuthFlow::new(douyin_config),
            MetricsClient::new(server_url, 7),
            SyncConfig {
                batch_pause_ms: 0,
                ..Default::default()
            },
        );

        Fixture {
            employees,
            tokens,
            snapshots,
            sync_records,
            orchestrator,
        }
    }

    fn add_employee(fx: &Fixture, name: &str, account: &str) -> String {
        fx.employees
            .add(NewEmployee {
                name: name.to_string(),
                department: String::new(),
                position: String::new(),
                douyin_account: account.to_string(),
            })
            .unwrap()
            .id
    }

    fn valid_token() -> TokenData {
        TokenData {
            access_token: "act".to_string(),
            refresh_token: "rft".to_string(),
            open_id: "open_x".to_string(),
            scope: "user_info".to_string(),
            expires_in: 7200,
            refresh_expires_in: 86400,
        }
    }

    fn data_body(field: &str, value: i64) -> String {
        format!(r#"{{"err_no": 0, "err_msg": "", "data": {{"{}": {}}}}}"#, field, value)
    }

    async fn mock_metric(
        server: &mut mockito::Server,
        path: &str,
        field: &str,
        value: i64,
    ) -> mockito::Mock {
        server
            .mock("POST", path)
            .with_status(200)
            .with_body(data_body(field, value))
            .create_async()
            .await
    }

    /// Mocks five healthy metric endpoints; the likes endpoint is left to
    /// the caller. The returned guards must stay alive for the test.
    async fn mock_all_but_likes(server: &mut mockito::Server) -> Vec<mockito::Mock> {
        let mut mocks = vec![
            mock_metric(server, "/data/external/user/fans/", "fans_count", 12000).await,
            mock_metric(server, "/data/external/user/comment/", "comment_count", 40).await,
            mock_metric(server, "/data/external/user/share/", "share_count", 15).await,
            mock_metric(server, "/data/external/user/item/", "video_count", 9).await,
        ];
        mocks.push(
            server
                .mock("GET", "/data/external/user/profile/")
                .match_query(mockito::Matcher::Any)
                .with_status(200)
                .with_body(data_body("home_pv", 300))
                .create_async()
                .await,
        );
        mocks.push(
            server
                .mock("POST", "/video/list/")
                .with_status(200)
                .with_body(r#"{"extra": {"error_code": 0}, "data": {"list": [], "has_more": false}}"#)
                .create_async()
                .await,
        );
        mocks
    }

    #[tokio::test]
    async fn test_sync_never_regresses_a_counter() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_all_but_likes(&mut server).await;
        let _likes = server
            .mock("POST", "/data/external/user/like/")
            .with_status(200)
            .with_body(r#"{"err_no": 20028001006, "err_msg": "network call failed"}"#)
            .create_async()
            .await;

        let fx = fixture(&server.url());
        let emp_id = add_employee(&fx, "Zhang", "zhang_dy");
        fx.tokens.save(&emp_id, &valid_token()).unwrap();

        // Seed a prior likes value to prove it is kept, not zeroed
        fx.employees
            .update(
                &emp_id,
                &EmployeeUpdate {
                    like_count: Some(77),
                    ..Default::default()
                },
            )
            .unwrap();

        let outcome = fx.orchestrator.sync_employee(&emp_id).await.unwrap();
        assert_eq!(outcome.succeeded, 5);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors.len(), 1);

        let emp = fx.employees.get(&emp_id).unwrap().unwrap();
        assert_eq!(emp.counters.fans_count, 12000);
        assert_eq!(emp.counters.like_count, 77); // unchanged
        assert_eq!(emp.counters.home_pv, 300);
        assert!(emp.last_sync_time.is_some());

        // Snapshot row carries the merged values
        let snap = fx.snapshots.latest(&emp_id).unwrap().unwrap();
        assert_eq!(snap.counters.fans_count, 12000);
        assert_eq!(snap.counters.like_count, 77);
    }

    #[tokio::test]
    async fn test_sync_without_token_is_not_found() {
        let server = mockito::Server::new_async().await;
        let fx = fixture(&server.url());
        let emp_id = add_employee(&fx, "Zhang", "zhang_dy");

        let err = fx.orchestrator.sync_employee(&emp_id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once_and_syncs() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_all_but_likes(&mut server).await;
        let _likes = mock_metric(&mut server, "/data/external/user/like/", "like_count", 50).await;
        let refresh_mock = server
            .mock("POST", "/oauth/refresh_token/")
            .with_status(200)
            .with_body(
                r#"{"data": {"error_code": 0, "access_token": "act.new",
                             "refresh_token": "rft.new", "open_id": "open_x",
                             "expires_in": 7200, "refresh_expires_in": 86400}}"#,
            )
            .create_async()
            .await;

        let fx = fixture(&server.url());
        let emp_id = add_employee(&fx, "Zhang", "zhang_dy");
        // expires_in = 0 → already past the derived expiry
        fx.tokens
            .save(
                &emp_id,
                &TokenData {
                    expires_in: 0,
                    ..valid_token()
                },
            )
            .unwrap();

        let outcome = fx.orchestrator.sync_employee(&emp_id).await.unwrap();
        assert_eq!(outcome.succeeded, 6);
        refresh_mock.assert_async().await;

        // Token replaced, employee back to authorized
        let token = fx.tokens.get(&emp_id).unwrap().unwrap();
        assert_eq!(token.access_token, "act.new");
        let emp = fx.employees.get(&emp_id).unwrap().unwrap();
        assert_eq!(emp.auth_status, AuthStatus::Authorized);
    }

    #[tokio::test]
    async fn test_refresh_failure_marks_employee_expired() {
        let mut server = mockito::Server::new_async().await;
        let _refresh = server
            .mock("POST", "/oauth/refresh_token/")
            .with_status(200)
            .with_body(r#"{"data": {"error_code": 10010, "description": "refresh token invalid"}}"#)
            .create_async()
            .await;

        let fx = fixture(&server.url());
        let emp_id = add_employee(&fx, "Zhang", "zhang_dy");
        fx.tokens
            .save(
                &emp_id,
                &TokenData {
                    expires_in: 0,
                    ..valid_token()
                },
            )
            .unwrap();

        let err = fx.orchestrator.sync_employee(&emp_id).await.unwrap_err();
        assert!(err.is_token_problem());

        let emp = fx.employees.get(&emp_id).unwrap().unwrap();
        assert_eq!(emp.auth_status, AuthStatus::Expired);
    }

    #[tokio::test]
    async fn test_batch_counts_are_consistent() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_all_but_likes(&mut server).await;
        let _likes = mock_metric(&mut server, "/data/external/user/like/", "like_count", 50).await;

        let fx = fixture(&server.url());

        // Two authorized employees with tokens, one authorized with no token
        let a = add_employee(&fx, "Zhang", "zhang_dy");
        let b = add_employee(&fx, "Li", "li_dy");
        let c = add_employee(&fx, "Wang", "wang_dy");
        fx.tokens.save(&a, &valid_token()).unwrap();
        fx.tokens.save(&b, &valid_token()).unwrap();
        fx.employees
            .set_auth_status(&c, AuthStatus::Authorized)
            .unwrap();

        let outcome = fx.orchestrator.run_manual(None).await.unwrap();
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.success_count + outcome.failed_count, 3);
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failed_count, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("Wang"));

        // The run is persisted with the same numbers
        let record = fx.sync_records.get(outcome.sync_record_id).unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Failed);
        assert_eq!(record.success_count, 2);
        assert_eq!(record.failed_count, 1);
        assert!(record.error_message.unwrap().contains("Wang"));
    }

    #[tokio::test]
    async fn test_batch_skips_unauthorized_employees() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_all_but_likes(&mut server).await;
        let _likes = mock_metric(&mut server, "/data/external/user/like/", "like_count", 50).await;

        let fx = fixture(&server.url());
        let a = add_employee(&fx, "Zhang", "zhang_dy");
        fx.tokens.save(&a, &valid_token()).unwrap();
        // Pending employee — not a batch target
        add_employee(&fx, "Li", "li_dy");

        let outcome = fx.orchestrator.run_manual(None).await.unwrap();
        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.success_count, 1);
    }

    #[tokio::test]
    async fn test_manual_sync_unknown_employee_is_not_found() {
        let server = mockito::Server::new_async().await;
        let fx = fixture(&server.url());

        let err = fx.orchestrator.run_manual(Some("emp_ghost")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        // No record is opened for a target that never existed
        assert!(fx.sync_records.history(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_total_failure_still_returns_structured_outcome() {
        let mut server = mockito::Server::new_async().await;
        // Every metric endpoint rejects the token
        let mut _mocks = Vec::new();
        for path in [
            "/data/external/user/fans/",
            "/data/external/user/like/",
            "/data/external/user/comment/",
            "/data/external/user/share/",
            "/data/external/user/item/",
        ] {
            _mocks.push(
                server
                    .mock("POST", path)
                    .with_status(200)
                    .with_body(r#"{"err_no": 20028001003, "err_msg": "access token invalid"}"#)
                    .create_async()
                    .await,
            );
        }
        _mocks.push(
            server
                .mock("GET", "/data/external/user/profile/")
                .match_query(mockito::Matcher::Any)
                .with_status(200)
                .with_body(r#"{"err_no": 20028001003, "err_msg": "access token invalid"}"#)
                .create_async()
                .await,
        );

        let fx = fixture(&server.url());
        let emp_id = add_employee(&fx, "Zhang", "zhang_dy");
        fx.tokens.save(&emp_id, &valid_token()).unwrap();

        let outcome = fx.orchestrator.sync_employee(&emp_id).await.unwrap();
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.failed, 6);

        // Counters and history untouched
        let emp = fx.employees.get(&emp_id).unwrap().unwrap();
        assert_eq!(emp.counters, MetricCounters::default());
        assert!(emp.last_sync_time.is_none());
        assert!(fx.snapshots.latest(&emp_id).unwrap().is_none());

        // As a batch member this employee counts as failed
        let batch = fx.orchestrator.run_manual(Some(&emp_id)).await.unwrap();
        assert_eq!(batch.failed_count, 1);
        assert_eq!(batch.success_count, 0);
    }
}
