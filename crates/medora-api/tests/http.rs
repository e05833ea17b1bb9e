use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use tower::ServiceExt;

use medora_api::blob::LocalBlobStore;
use medora_api::{AppStateInner, routes};
use medora_db::Database;
use medora_gateway::dispatcher::Dispatcher;
use medora_gateway::rooms::RoomMember;
use medora_gateway::service::ConsultationService;
use medora_types::api::Claims;
use medora_types::events::ServerEvent;
use medora_types::models::Role;

const SECRET: &str = "test-secret";
const BOUNDARY: &str = "medora-boundary";

struct Harness {
    app: Router,
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

async fn harness(realtime: bool) -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.upsert_appointment("A123", "P", "D", "accepted").unwrap();
    let dir = std::env::temp_dir().join(format!("medora-api-{}", uuid::Uuid::new_v4()));
    let blobs = LocalBlobStore::new(dir, db.clone(), "").await.unwrap();
    let dispatcher = Dispatcher::new();

    let state = Arc::new(AppStateInner {
        service: ConsultationService::sqlite(db.clone()),
        realtime: realtime.then(|| dispatcher.clone()),
        blobs: Arc::new(blobs),
        jwt_secret: SECRET.into(),
        max_upload_bytes: 1024,
    });
    Harness {
        app: routes(state),
        db,
        dispatcher,
    }
}

fn token(sub: &str, role: Role) -> String {
    let claims = Claims {
        sub: sub.into(),
        role,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn get(uri: &str, bearer: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, bearer: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .body(Body::empty())
        .unwrap()
}

fn upload(uri: &str, bearer: &str, role: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"senderRole\"\r\n\r\n{role}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scan.png\"\r\n\
             Content-Type: image/png\r\n\r\n",
            b = BOUNDARY,
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let h = harness(false).await;

    let missing = Request::get("/consultations/active").body(Body::empty()).unwrap();
    let res = h.app.clone().oneshot(missing).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = h.app.oneshot(get("/consultations/active", "not-a-jwt")).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn accept_hook_is_idempotent_and_doctor_only() {
    let h = harness(false).await;
    let doctor = token("D", Role::Doctor);

    let res = h.app.clone().oneshot(post("/consultations/A123", &doctor)).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = json(res).await;
    assert_eq!(body["created"], true);
    assert_eq!(body["session"]["isActive"], true);

    let res = h.app.clone().oneshot(post("/consultations/A123", &doctor)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json(res).await["created"], false);

    let patient = token("P", Role::Patient);
    let res = h.app.clone().oneshot(post("/consultations/A123", &patient)).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let other = token("D2", Role::Doctor);
    let res = h.app.oneshot(post("/consultations/A123", &other)).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn history_requires_participant_and_session() {
    let h = harness(false).await;
    let patient = token("P", Role::Patient);

    let res = h.app.clone().oneshot(get("/consultations/A123/messages", &patient)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(res).await["error"], "not-found");

    h.app.clone().oneshot(post("/consultations/A123", &token("D", Role::Doctor))).await.unwrap();

    let res = h.app.clone().oneshot(get("/consultations/A123/messages", &patient)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json(res).await;
    assert_eq!(body["isActive"], true);
    assert_eq!(body["messages"].as_array().unwrap().len(), 0);

    let outsider = token("U", Role::Patient);
    let res = h.app.oneshot(get("/consultations/A123/messages", &outsider)).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn upload_persists_broadcasts_and_serves_file() {
    let h = harness(true).await;
    let patient = token("P", Role::Patient);
    h.app.clone().oneshot(post("/consultations/A123", &token("D", Role::Doctor))).await.unwrap();

    let (doctor_conn, mut doctor_rx) = h.dispatcher.register_connection().await;
    h.dispatcher
        .join_room(
            "A123",
            doctor_conn,
            RoomMember {
                participant_id: "D".into(),
                role: Role::Doctor,
            },
        )
        .await;

    let res = h
        .app
        .clone()
        .oneshot(upload("/consultations/A123/upload", &patient, "patient", b"\x89PNG"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = json(res).await;
    assert_eq!(body["message"]["kind"], "image");
    assert_eq!(body["message"]["fileName"], "scan.png");
    assert_eq!(body["message"]["fileSize"], 4);
    let file_url = body["fileUrl"].as_str().unwrap().to_string();
    assert_eq!(body["message"]["fileUrl"], file_url.as_str());

    match doctor_rx.try_recv() {
        Ok(ServerEvent::MessageBroadcast { message, .. }) => {
            assert_eq!(message.file_url.as_deref(), Some(file_url.as_str()));
        }
        other => panic!("expected message-broadcast, got {:?}", other),
    }
    assert_eq!(h.db.get_messages("A123").unwrap().len(), 1);

    let res = h.app.oneshot(get(&file_url, &patient)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"\x89PNG");
}

#[tokio::test]
async fn upload_without_gateway_still_persists() {
    let h = harness(false).await;
    let doctor = token("D", Role::Doctor);
    h.app.clone().oneshot(post("/consultations/A123", &doctor)).await.unwrap();

    let res = h
        .app
        .oneshot(upload("/consultations/A123/upload", &doctor, "doctor", b"%PDF"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(h.db.get_messages("A123").unwrap().len(), 1);
}

#[tokio::test]
async fn upload_errors_map_to_status_codes() {
    let h = harness(false).await;
    let patient = token("P", Role::Patient);

    // no session yet
    let res = h
        .app
        .clone()
        .oneshot(upload("/consultations/A123/upload", &patient, "patient", b"x"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    h.app.clone().oneshot(post("/consultations/A123", &token("D", Role::Doctor))).await.unwrap();

    let res = h
        .app
        .clone()
        .oneshot(upload("/consultations/A123/upload", &patient, "nurse", b"x"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = h
        .app
        .clone()
        .oneshot(upload("/consultations/A123/upload", &token("U", Role::Patient), "patient", b"x"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = h
        .app
        .clone()
        .oneshot(upload("/consultations/A123/upload", &patient, "patient", &[0u8; 2048]))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    h.db
        .end_consultation("A123", medora_db::models::to_millis(chrono::Utc::now()))
        .unwrap();
    let res = h
        .app
        .oneshot(upload("/consultations/A123/upload", &patient, "patient", b"x"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert!(h.db.get_messages("A123").unwrap().is_empty());
}

#[tokio::test]
async fn active_list_carries_unread_counts() {
    let h = harness(false).await;
    let doctor = token("D", Role::Doctor);
    h.app.clone().oneshot(post("/consultations/A123", &doctor)).await.unwrap();
    h.app
        .clone()
        .oneshot(upload("/consultations/A123/upload", &doctor, "doctor", b"%PDF"))
        .await
        .unwrap();

    let res = h
        .app
        .oneshot(get("/consultations/active", &token("P", Role::Patient)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json(res).await;
    let list = body["consultations"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["appointmentId"], "A123");
    assert_eq!(list[0]["unreadCount"], 1);
}
