use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use reqwest::StatusCode;
use serde_json::{Value, json};

use gatehouse_api::config::Config;

const SUPERADMIN_EMAIL: &str = "superadmin@email.com";
const SUPERADMIN_SECRET: &str = "superadmin";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Same router as prod (in-memory store, cheap hashing), bound to an ephemeral port.
        let app = gatehouse_api::app::build_app(Config::for_tests(jwt_secret))
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}/v1/auth", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    async fn token_for(&self, email: &str, password: &str) -> String {
        let res = self.login(email, password).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn superadmin_token(&self) -> String {
        self.token_for(SUPERADMIN_EMAIL, SUPERADMIN_SECRET).await
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn patch(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn decode_claims(jwt_secret: &str, token: &str) -> Value {
    jsonwebtoken::decode::<Value>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .expect("token should verify with the server secret")
    .claims
}

fn mint_jwt(jwt_secret: &str, permissions: &[&str], issued_hours_ago: i64, ttl_hours: i64) -> String {
    let iat = Utc::now() - ChronoDuration::hours(issued_hours_ago);
    let exp = iat + ChronoDuration::hours(ttl_hours);
    let claims = json!({
        "userId": 1,
        "role": 1,
        "permissions": permissions,
        "iat": iat.timestamp(),
        "exp": exp.timestamp(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn error_code(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

/// Create a role and an active user holding it; returns the user's email.
async fn user_with_role(srv: &TestServer, admin: &str, role: &str, permissions: &[&str]) -> (i64, String) {
    let res = srv
        .post("/roles", admin, json!({ "name": role, "permissions": permissions }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let role_id = body["role"]["id"].as_i64().unwrap();

    let email = format!("{role}@example.com");
    let res = srv
        .post(
            "/users",
            admin,
            json!({
                "username": role,
                "email": email,
                "password": "member-secret",
                "role": role_id,
                "is_active": true,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    (role_id, email)
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn("test-secret").await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn superadmin_login_carries_full_universe() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let res = srv.login(SUPERADMIN_EMAIL, SUPERADMIN_SECRET).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["email"], SUPERADMIN_EMAIL);
    assert!(body["user"].get("password_hash").is_none());

    let claims = decode_claims(jwt_secret, body["token"].as_str().unwrap());
    let permissions: Vec<&str> = claims["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap())
        .collect();
    assert_eq!(
        permissions,
        vec![
            "users:read",
            "users:create",
            "users:update",
            "users:delete",
            "roles:list",
            "roles:read",
            "roles:create",
            "roles:update",
            "roles:delete",
            "permissions:create",
            "permissions:delete",
            "permissions:list",
        ]
    );
    let ttl = claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap();
    assert_eq!(ttl, 10 * 3600);
}

#[tokio::test]
async fn bad_credentials_are_indistinguishable() {
    let srv = TestServer::spawn("test-secret").await;

    let wrong_secret = srv.login(SUPERADMIN_EMAIL, "not-the-secret").await;
    assert_eq!(wrong_secret.status(), StatusCode::UNAUTHORIZED);
    let wrong_secret: Value = wrong_secret.json().await.unwrap();

    let unknown = srv.login("nobody@example.com", SUPERADMIN_SECRET).await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let unknown: Value = unknown.json().await.unwrap();

    assert_eq!(wrong_secret, unknown);
    assert_eq!(unknown["message"], "invalid email or password");
}

#[tokio::test]
async fn inactive_account_cannot_log_in() {
    let srv = TestServer::spawn("test-secret").await;
    let admin = srv.superadmin_token().await;

    let res = srv
        .post(
            "/users",
            &admin,
            json!({
                "username": "dormant",
                "email": "dormant@example.com",
                "password": "dormant-secret",
                "role": 1,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv.login("dormant@example.com", "dormant-secret").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "account is not active");
}

#[tokio::test]
async fn missing_token_is_unauthenticated_not_forbidden() {
    let srv = TestServer::spawn("test-secret").await;

    let res = srv
        .client
        .delete(srv.url("/users/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "unauthenticated");
}

#[tokio::test]
async fn snapshot_decides_membership() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, &["roles:list"], 0, 1);

    let res = srv.get("/roles", &token).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.post("/roles", &token, json!({ "name": "x", "permissions": [] })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "forbidden");
}

#[tokio::test]
async fn revocation_only_affects_newly_issued_tokens() {
    let srv = TestServer::spawn("test-secret").await;
    let admin = srv.superadmin_token().await;

    let (role_id, email) = user_with_role(&srv, &admin, "auditor", &["roles:list", "roles:read"]).await;
    let before = srv.token_for(&email, "member-secret").await;
    assert_eq!(srv.get(&format!("/roles/{role_id}"), &before).await.status(), StatusCode::OK);

    // Revoke roles:read from the role.
    let res = srv
        .patch(&format!("/roles/{role_id}"), &admin, json!({ "permissions": ["roles:list"] }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    // The earlier token still carries its snapshot.
    assert_eq!(srv.get(&format!("/roles/{role_id}"), &before).await.status(), StatusCode::OK);

    // A token issued after the change reflects it.
    let after = srv.token_for(&email, "member-secret").await;
    assert_eq!(
        srv.get(&format!("/roles/{role_id}"), &after).await.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(srv.get("/roles", &after).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_picks_up_current_role_permissions() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let admin = srv.superadmin_token().await;

    let (role_id, email) = user_with_role(&srv, &admin, "viewer", &["users:read"]).await;
    let token = srv.token_for(&email, "member-secret").await;

    srv.patch(
        &format!("/roles/{role_id}"),
        &admin,
        json!({ "permissions": ["users:read", "roles:list"] }),
    )
    .await;

    let res = srv.post("/refresh", &token, json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let claims = decode_claims(jwt_secret, body["token"].as_str().unwrap());
    assert_eq!(claims["permissions"], json!(["users:read", "roles:list"]));

    // Logout is an acknowledgement only; the old token keeps working until expiry.
    assert_eq!(srv.post("/logout", &token, json!({})).await.status(), StatusCode::OK);
    assert_eq!(srv.get("/users", &token).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn me_echoes_the_token_snapshot() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, &["roles:list", "users:read"], 0, 1);

    let res = srv.get("/me", &token).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["userId"], 1);
    assert_eq!(body["role"], 1);
    assert_eq!(body["permissions"], json!(["roles:list", "users:read"]));
}

#[tokio::test]
async fn expired_or_forged_tokens_are_rejected() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let expired = mint_jwt(jwt_secret, &["users:read"], 3, 2);
    let res = srv.get("/users", &expired).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let forged = mint_jwt("someone-else", &["users:read"], 0, 1);
    let res = srv.get("/users", &forged).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv.get("/users", "not-a-jwt").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn batch_permission_create_is_all_or_nothing() {
    let srv = TestServer::spawn("test-secret").await;
    let admin = srv.superadmin_token().await;

    let res = srv
        .post(
            "/permissions",
            &admin,
            json!({ "permissions": ["reports:read", "users:read", "reports:export"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(res).await, "transaction_error");

    let res = srv.get("/permissions?group=reports", &admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["permissions"], json!([]));

    let res = srv
        .post("/permissions", &admin, json!({ "permissions": ["reports:read", "reports:export"] }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv.get("/permissions?group=reports", &admin).await;
    let body: Value = res.json().await.unwrap();
    let names: Vec<&str> = body["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["reports:read", "reports:export"]);
}

#[tokio::test]
async fn malformed_input_is_rejected_before_the_store() {
    let srv = TestServer::spawn("test-secret").await;
    let admin = srv.superadmin_token().await;

    let res = srv.get("/roles/abc", &admin).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .post("/permissions", &admin, json!({ "permissions": ["reports.read"] }))
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = srv.get("/roles/999", &admin).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleted_user_disappears() {
    let srv = TestServer::spawn("test-secret").await;
    let admin = srv.superadmin_token().await;
    let (_, email) = user_with_role(&srv, &admin, "temp", &[]).await;

    let res = srv.get("/users", &admin).await;
    let body: Value = res.json().await.unwrap();
    let id = body["users"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == email.as_str())
        .map(|u| u["id"].as_i64().unwrap())
        .unwrap();

    let res = srv
        .client
        .delete(srv.url(&format!("/users/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    assert_eq!(srv.get(&format!("/users/{id}"), &admin).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(srv.login(&email, "member-secret").await.status(), StatusCode::UNAUTHORIZED);
}

async fn register(srv: &TestServer, body: Value) -> reqwest::Response {
    srv.client
        .post(srv.url("/register"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn verify_email(srv: &TestServer, token: &str) -> reqwest::Response {
    srv.client
        .get(srv.url("/verify-email"))
        .query(&[("token", token)])
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn registration_starts_inactive_and_unverified() {
    let srv = TestServer::spawn("test-secret").await;
    let admin = srv.superadmin_token().await;
    let res = srv
        .post("/roles", &admin, json!({ "name": "reader", "permissions": ["roles:list"] }))
        .await;
    let role_id = res.json::<Value>().await.unwrap()["role"]["id"].as_i64().unwrap();

    let res = register(
        &srv,
        json!({
            "username": "carol",
            "email": "Carol@Example.com",
            "password": "carol-secret",
            "role": role_id,
            "is_active": true,
            "is_verified": true,
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["email"], "carol@example.com");
    assert_eq!(body["user"]["is_active"], false);
    assert_eq!(body["user"]["is_verified"], false);
    assert!(body["user"].get("password_hash").is_none());

    let res = srv.login("carol@example.com", "carol-secret").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "account is not active");

    let res = register(
        &srv,
        json!({ "username": "carol2", "email": "carol@example.com", "password": "carol-secret", "role": role_id }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = register(&srv, json!({ "username": "dave", "email": "dave@example.com", "password": "short", "role": role_id })).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn email_verification_requires_a_signed_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let admin = srv.superadmin_token().await;
    let res = srv
        .post("/roles", &admin, json!({ "name": "reader", "permissions": [] }))
        .await;
    let role_id = res.json::<Value>().await.unwrap()["role"]["id"].as_i64().unwrap();

    let res = register(
        &srv,
        json!({ "username": "erin", "email": "erin@example.com", "password": "erin-secret", "role": role_id }),
    )
    .await;
    let user_id = res.json::<Value>().await.unwrap()["user"]["id"].as_i64().unwrap();

    // A session token or a bare id is not a verification token.
    assert_eq!(verify_email(&srv, &admin).await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(verify_email(&srv, &user_id.to_string()).await.status(), StatusCode::BAD_REQUEST);
    let res = srv.client.get(srv.url("/verify-email")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Minting one needs users:update.
    let res = srv
        .post(&format!("/users/{user_id}/verification"), "", json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let res = srv
        .post(&format!("/users/{user_id}/verification"), &admin, json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = res.json::<Value>().await.unwrap()["token"].as_str().unwrap().to_string();
    assert_eq!(decode_claims(jwt_secret, &token)["purpose"], "verify_email");

    let res = verify_email(&srv, &token).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["is_verified"], true);
    assert_eq!(body["user"]["is_active"], false);

    // Replaying is harmless, and no new token is handed out once verified.
    assert_eq!(verify_email(&srv, &token).await.status(), StatusCode::OK);
    let res = srv
        .post(&format!("/users/{user_id}/verification"), &admin, json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Activation stays an administrative step.
    let res = srv
        .patch(&format!("/users/{user_id}"), &admin, json!({ "is_active": true }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(srv.login("erin@example.com", "erin-secret").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn verification_token_is_bound_to_the_email() {
    let srv = TestServer::spawn("test-secret").await;
    let admin = srv.superadmin_token().await;
    let res = srv
        .post("/roles", &admin, json!({ "name": "reader", "permissions": [] }))
        .await;
    let role_id = res.json::<Value>().await.unwrap()["role"]["id"].as_i64().unwrap();

    let res = register(
        &srv,
        json!({ "username": "frank", "email": "frank@example.com", "password": "frank-secret", "role": role_id }),
    )
    .await;
    let user_id = res.json::<Value>().await.unwrap()["user"]["id"].as_i64().unwrap();

    let res = srv
        .post(&format!("/users/{user_id}/verification"), &admin, json!({}))
        .await;
    let token = res.json::<Value>().await.unwrap()["token"].as_str().unwrap().to_string();

    let res = srv
        .patch(&format!("/users/{user_id}"), &admin, json!({ "email": "frank@other.example" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(verify_email(&srv, &token).await.status(), StatusCode::BAD_REQUEST);
    let res = srv.get(&format!("/users/{user_id}"), &admin).await;
    assert_eq!(res.json::<Value>().await.unwrap()["user"]["is_verified"], false);
}
