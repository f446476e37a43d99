use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDateTime;
use tower::ServiceExt;

use slotwise::clock::FixedClock;
use slotwise::config::AppConfig;
use slotwise::db;
use slotwise::handlers;
use slotwise::models::{Channel, ResourceKind, TimeUnit};
use slotwise::services::catalog::{
    self, NewAvailability, NewCompany, NewReminderConfig, NewResource, NewService,
};
use slotwise::services::messaging::{NotificationSender, ReminderTemplate};
use slotwise::state::AppState;

// ── Mock Notifier ──

#[derive(Default)]
struct MockNotifier {
    sent: Arc<Mutex<Vec<(Channel, String, String)>>>,
}

#[async_trait]
impl NotificationSender for MockNotifier {
    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        template: &ReminderTemplate,
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((
            channel,
            recipient.to_string(),
            template.booking_id.clone(),
        ));
        Ok(())
    }
}

// ── Helpers ──

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        cron_secret: "cron-secret".to_string(),
        public_base_url: "https://book.example".to_string(),
        auto_confirm_bookings: false,
        slot_step_minutes: 30,
        booking_tx_timeout_ms: 5000,
        reminder_tick_minutes: 15,
        reminder_tolerance_minutes: 20,
        reminder_ticker_enabled: false,
        notify_timeout_secs: 10,
        email_api_url: String::new(),
        email_api_key: String::new(),
        email_from: String::new(),
        twilio_account_sid: String::new(),
        twilio_auth_token: String::new(),
        twilio_phone_number: String::new(),
    }
}

struct TestHarness {
    state: Arc<AppState>,
    clock: Arc<FixedClock>,
    sent: Arc<Mutex<Vec<(Channel, String, String)>>>,
}

impl TestHarness {
    fn new(config: AppConfig) -> Self {
        let conn = db::init_db(":memory:").unwrap();
        // 2025-06-10 is the Tuesday before the Monday most tests book on.
        let clock = Arc::new(FixedClock::new(dt("2025-06-10 08:00")));
        let notifier = MockNotifier::default();
        let sent = Arc::clone(&notifier.sent);
        let state = Arc::new(AppState {
            db: Arc::new(Mutex::new(conn)),
            config,
            notifier: Box::new(notifier),
            clock: clock.clone(),
            reminder_tick: tokio::sync::Mutex::new(()),
        });
        Self { state, clock, sent }
    }

    fn app(&self) -> Router {
        handlers::router(Arc::clone(&self.state))
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let res = self.app().oneshot(request).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// One company with a staff member open Mondays 09:00-12:00 and a
    /// 60-minute service. Returns (company_id, resource_id, service_id).
    fn seed(&self) -> (String, String, String) {
        let db = self.state.db.lock().unwrap();
        let company = catalog::create_company(&db, &NewCompany { name: "Acme Salon".to_string() }).unwrap();
        let resource = catalog::create_resource(
            &db,
            &NewResource {
                company_id: company.id.clone(),
                name: "Sam".to_string(),
                kind: ResourceKind::Staff,
            },
        )
        .unwrap();
        catalog::add_availability(
            &db,
            &resource.id,
            &NewAvailability {
                day_of_week: 1,
                start_time: "09:00".to_string(),
                end_time: "12:00".to_string(),
                is_available: true,
            },
        )
        .unwrap();
        let service = catalog::create_service(
            &db,
            &NewService {
                company_id: company.id.clone(),
                name: "Haircut".to_string(),
                duration_minutes: 60,
                resource_ids: vec![resource.id.clone()],
            },
        )
        .unwrap();
        (company.id, resource.id, service.id)
    }

    async fn book(&self, service_id: &str, resource_id: &str, start: &str) -> (StatusCode, serde_json::Value) {
        self.call(
            "POST",
            "/api/bookings",
            None,
            Some(serde_json::json!({
                "service_id": service_id,
                "resource_id": resource_id,
                "start_time": start,
                "customer": {"name": "Alice", "email": "alice@example.com", "phone": "+15550001111"},
                "notes": null,
            })),
        )
        .await
    }
}

fn token_from(link: &serde_json::Value) -> String {
    link.as_str().unwrap().rsplit('/').next().unwrap().to_string()
}

fn slot_starts(json: &serde_json::Value) -> Vec<String> {
    json["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["start"].as_str().unwrap()[11..16].to_string())
        .collect()
}

// ── Health & Auth ──

#[tokio::test]
async fn test_health() {
    let harness = TestHarness::new(test_config());
    let (status, json) = harness.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_admin_requires_auth() {
    let harness = TestHarness::new(test_config());
    let body = serde_json::json!({"name": "Acme"});

    let (status, _) = harness
        .call("POST", "/api/admin/companies", None, Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = harness
        .call("POST", "/api/admin/companies", Some("wrong-token"), Some(body))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cron_requires_its_own_secret() {
    let harness = TestHarness::new(test_config());

    let (status, _) = harness
        .call("POST", "/api/cron/reminders", Some("test-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = harness
        .call("POST", "/api/cron/reminders", Some("cron-secret"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sent"], 0);
}

// ── Tenant setup through the admin API ──

#[tokio::test]
async fn test_admin_setup_then_list_slots() {
    let harness = TestHarness::new(test_config());
    let admin = Some("test-token");

    let (status, company) = harness
        .call("POST", "/api/admin/companies", admin, Some(serde_json::json!({"name": "Acme"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let company_id = company["id"].as_str().unwrap().to_string();

    let (status, resource) = harness
        .call(
            "POST",
            "/api/admin/resources",
            admin,
            Some(serde_json::json!({"company_id": company_id, "name": "Sam"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(resource["kind"], "staff");
    let resource_id = resource["id"].as_str().unwrap().to_string();

    let (status, rule) = harness
        .call(
            "POST",
            &format!("/api/admin/resources/{resource_id}/availability"),
            admin,
            Some(serde_json::json!({"day_of_week": 1, "start_time": "09:00", "end_time": "12:00"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rule["start_time"], "09:00");

    let (status, service) = harness
        .call(
            "POST",
            "/api/admin/services",
            admin,
            Some(serde_json::json!({
                "company_id": company_id,
                "name": "Haircut",
                "duration_minutes": 60,
                "resource_ids": [resource_id],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let service_id = service["id"].as_str().unwrap().to_string();

    let (status, json) = harness
        .call(
            "GET",
            &format!("/api/services/{service_id}/slots?start_date=2025-06-16&end_date=2025-06-16"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slot_starts(&json), ["09:00", "09:30", "10:00", "10:30", "11:00"]);
    assert_eq!(json["slots"][0]["resource_id"], resource_id.as_str());
}

#[tokio::test]
async fn test_blockout_hides_slots() {
    let harness = TestHarness::new(test_config());
    let (_, resource_id, service_id) = harness.seed();

    let (status, _) = harness
        .call(
            "POST",
            &format!("/api/admin/resources/{resource_id}/blockouts"),
            Some("test-token"),
            Some(serde_json::json!({
                "start_time": "2025-06-16T09:00:00",
                "end_time": "2025-06-16T10:30:00",
                "reason": "training",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, json) = harness
        .call(
            "GET",
            &format!("/api/services/{service_id}/slots?start_date=2025-06-16&end_date=2025-06-16&step=60"),
            None,
            None,
        )
        .await;
    assert_eq!(slot_starts(&json), ["11:00"]);
}

#[tokio::test]
async fn test_slot_query_validation() {
    let harness = TestHarness::new(test_config());
    let (_, _, service_id) = harness.seed();

    let (status, _) = harness
        .call(
            "GET",
            &format!("/api/services/{service_id}/slots?start_date=2025-06-17&end_date=2025-06-16"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = harness
        .call(
            "GET",
            "/api/services/missing/slots?start_date=2025-06-16&end_date=2025-06-16",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_out_of_range_inputs_leave_the_store_usable() {
    let harness = TestHarness::new(test_config());
    let (company_id, resource_id, service_id) = harness.seed();

    let (status, _) = harness
        .call(
            "GET",
            &format!(
                "/api/services/{service_id}/slots?start_date=2025-06-16&end_date=2025-06-16&step={}",
                i64::MAX
            ),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = harness.book(&service_id, &resource_id, "+262142-12-31T23:30:00").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = harness
        .call(
            "POST",
            "/api/admin/reminder-configs",
            Some("test-token"),
            Some(serde_json::json!({
                "company_id": company_id,
                "time_value": i64::MAX,
                "time_unit": "days",
                "channel": "email",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = harness
        .call("POST", "/api/cron/reminders", Some("cron-secret"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness.book(&service_id, &resource_id, "2025-06-16T10:00:00").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = harness
        .call("GET", "/api/admin/bookings", Some("test-token"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

// ── Booking flow ──

#[tokio::test]
async fn test_booking_hides_slot_and_blocks_double_booking() {
    let harness = TestHarness::new(test_config());
    let (_, resource_id, service_id) = harness.seed();

    let (status, created) = harness.book(&service_id, &resource_id, "2025-06-16T10:00:00").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["booking"]["status"], "pending");
    assert_eq!(created["booking"]["end_time"], "2025-06-16T11:00:00");
    assert!(created["booking"].get("cancellation_token").is_none());
    assert!(created["links"]["confirm"]
        .as_str()
        .unwrap()
        .starts_with("https://book.example/booking/confirm/"));

    let (_, json) = harness
        .call(
            "GET",
            &format!("/api/services/{service_id}/slots?start_date=2025-06-16&end_date=2025-06-16"),
            None,
            None,
        )
        .await;
    assert_eq!(slot_starts(&json), ["09:00", "11:00"]);

    let (status, json) = harness.book(&service_id, &resource_id, "2025-06-16T10:30:00").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["hint"], "please refetch available slots");
}

#[tokio::test]
async fn test_booking_outside_hours_is_rejected() {
    let harness = TestHarness::new(test_config());
    let (_, resource_id, service_id) = harness.seed();

    let (status, _) = harness.book(&service_id, &resource_id, "2025-06-16T11:30:00").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_confirm_link_works_once() {
    let harness = TestHarness::new(test_config());
    let (_, resource_id, service_id) = harness.seed();
    let (_, created) = harness.book(&service_id, &resource_id, "2025-06-16T10:00:00").await;
    let token = token_from(&created["links"]["confirm"]);
    let uri = format!("/api/bookings/confirm/{token}");

    let (status, json) = harness.call("POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");
    assert_eq!(json["service_name"], "Haircut");
    assert_eq!(json["company_name"], "Acme Salon");

    let (status, json) = harness.call("POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(json["error"], "this link is invalid or has expired");

    let (status, _) = harness
        .call("POST", "/api/bookings/confirm/not-a-real-token", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_link_is_idempotent_and_frees_slot() {
    let harness = TestHarness::new(test_config());
    let (_, resource_id, service_id) = harness.seed();
    let (_, created) = harness.book(&service_id, &resource_id, "2025-06-16T10:00:00").await;
    let uri = format!(
        "/api/bookings/cancel/{}",
        token_from(&created["links"]["cancel"])
    );

    let (status, json) = harness.call("POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");

    let (status, json) = harness.call("POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");

    let (status, _) = harness.book(&service_id, &resource_id, "2025-06-16T10:00:00").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_reschedule_rotates_link() {
    let harness = TestHarness::new(test_config());
    let (_, resource_id, service_id) = harness.seed();
    let (_, created) = harness.book(&service_id, &resource_id, "2025-06-16T09:00:00").await;
    let old = token_from(&created["links"]["reschedule"]);

    let (status, json) = harness
        .call(
            "POST",
            &format!("/api/bookings/reschedule/{old}"),
            None,
            Some(serde_json::json!({"start_time": "2025-06-16T11:00:00"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["booking"]["start_time"], "2025-06-16T11:00:00");
    let new = token_from(&json["links"]["reschedule"]);
    assert_ne!(new, old);

    let (status, _) = harness
        .call(
            "POST",
            &format!("/api/bookings/reschedule/{old}"),
            None,
            Some(serde_json::json!({"start_time": "2025-06-16T10:00:00"})),
        )
        .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_admin_completes_confirmed_booking() {
    let mut config = test_config();
    config.auto_confirm_bookings = true;
    let harness = TestHarness::new(config);
    let (_, resource_id, service_id) = harness.seed();
    let (_, created) = harness.book(&service_id, &resource_id, "2025-06-16T09:00:00").await;
    assert_eq!(created["booking"]["status"], "confirmed");
    assert!(created["links"]["confirm"].is_null());
    let id = created["booking"]["id"].as_str().unwrap().to_string();

    let (status, json) = harness
        .call("POST", &format!("/api/admin/bookings/{id}/complete"), Some("test-token"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");

    let (status, _) = harness
        .call("POST", &format!("/api/admin/bookings/{id}/no-show"), Some("test-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, json) = harness
        .call("GET", "/api/admin/bookings?status=completed", Some("test-token"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

// ── Reminders ──

#[tokio::test]
async fn test_cron_sends_due_reminder_once() {
    let mut config = test_config();
    config.auto_confirm_bookings = true;
    let harness = TestHarness::new(config);
    let (company_id, resource_id, service_id) = harness.seed();
    {
        let db = harness.state.db.lock().unwrap();
        catalog::create_reminder_config(
            &db,
            &NewReminderConfig {
                company_id,
                time_value: 24,
                time_unit: TimeUnit::Hours,
                channel: Channel::Email,
            },
        )
        .unwrap();
    }
    let (_, created) = harness.book(&service_id, &resource_id, "2025-06-16T10:00:00").await;
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();

    // Too early: the booking is more than 24h20m away.
    let (_, json) = harness
        .call("POST", "/api/cron/reminders", Some("cron-secret"), None)
        .await;
    assert_eq!(json["sent"], 0);

    harness.clock.set(dt("2025-06-15 09:50"));
    let (status, json) = harness
        .call("POST", "/api/cron/reminders", Some("cron-secret"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sent"], 1);

    harness.clock.set(dt("2025-06-15 09:55"));
    let (_, json) = harness
        .call("POST", "/api/cron/reminders", Some("cron-secret"), None)
        .await;
    assert_eq!(json["sent"], 0);

    let sent = harness.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0], (Channel::Email, "alice@example.com".to_string(), booking_id));
}

#[tokio::test]
async fn test_overlapping_cron_call_is_refused() {
    let harness = TestHarness::new(test_config());
    let _running = harness.state.reminder_tick.lock().await;

    let (status, json) = harness
        .call("POST", "/api/cron/reminders", Some("cron-secret"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "reminder tick already running");
}
