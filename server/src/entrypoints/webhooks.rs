use rocket::form::Form;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket::State;
use serde_json::Value;

use commit_games_server::db::DB;
use commit_games_server::ingest;
use commit_games_server::types::IngestError;
use shared::Service;

use super::types::WebhookAck;

#[derive(Debug, FromForm)]
pub struct PayloadForm {
    payload: String,
}

#[derive(Responder)]
pub enum WebhookResponse {
    #[response(status = 201, content_type = "json")]
    Created(Json<WebhookAck>),
    #[response(status = 200, content_type = "json")]
    Replayed(Json<WebhookAck>),
    #[response(status = 200, content_type = "plain")]
    Pong(&'static str),
    #[response(status = 400, content_type = "plain")]
    BadRequest(String),
    #[response(status = 500, content_type = "plain")]
    Failure(&'static str),
}

/// The `X-GitHub-Event` header, used to short-circuit ping deliveries before
/// any payload handling.
pub struct GithubEventHeader(Option<String>);

impl GithubEventHeader {
    fn is_ping(&self) -> bool {
        self.0.as_deref() == Some("ping")
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GithubEventHeader {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(GithubEventHeader(
            request.headers().get_one("X-GitHub-Event").map(str::to_string),
        ))
    }
}

/// 201 when the delivery created at least one commit, 200 for a full
/// re-delivery.
fn ack(outcome: ingest::IngestOutcome) -> WebhookResponse {
    let newly_created = !outcome.created.is_empty();
    let ack = Json(WebhookAck::from(outcome));
    if newly_created {
        WebhookResponse::Created(ack)
    } else {
        WebhookResponse::Replayed(ack)
    }
}

async fn handle(db: &State<DB>, service: Service, raw: Value) -> WebhookResponse {
    match ingest::process_webhook(db.inner(), service, &raw).await {
        Ok(outcome) => ack(outcome),
        Err(IngestError::Malformed(e)) => WebhookResponse::BadRequest(e.to_string()),
        Err(e) => {
            tracing::error!("webhook ingestion failed: {e:#}");
            WebhookResponse::Failure("ingestion failed")
        }
    }
}

fn form_payload(form: PayloadForm) -> Result<Value, WebhookResponse> {
    serde_json::from_str(&form.payload)
        .map_err(|e| WebhookResponse::BadRequest(format!("invalid payload json: {e}")))
}

#[utoipa::path(context_path = "/webhooks", responses(
    (status = 201, description = "Push ingested with newly created commits", body = WebhookAck),
    (status = 200, description = "Re-delivery, no new commits", body = WebhookAck)
))]
#[post("/github", format = "json", data = "<payload>", rank = 1)]
async fn github_json(
    db: &State<DB>,
    event: GithubEventHeader,
    payload: Json<Value>,
) -> WebhookResponse {
    if event.is_ping() {
        return WebhookResponse::Pong("pong");
    }
    handle(db, Service::Github, payload.into_inner()).await
}

#[post("/github", format = "form", data = "<form>", rank = 2)]
async fn github_form(
    db: &State<DB>,
    event: GithubEventHeader,
    form: Form<PayloadForm>,
) -> WebhookResponse {
    if event.is_ping() {
        return WebhookResponse::Pong("pong");
    }
    match form_payload(form.into_inner()) {
        Ok(raw) => handle(db, Service::Github, raw).await,
        Err(response) => response,
    }
}

#[post("/github", rank = 3)]
fn github_unsupported() -> WebhookResponse {
    WebhookResponse::BadRequest("unsupported content type".to_string())
}

#[utoipa::path(context_path = "/webhooks", responses(
    (status = 201, description = "Push ingested with newly created commits", body = WebhookAck)
))]
#[post("/gitlab", format = "json", data = "<payload>", rank = 1)]
async fn gitlab_json(db: &State<DB>, payload: Json<Value>) -> WebhookResponse {
    handle(db, Service::Gitlab, payload.into_inner()).await
}

#[post("/gitlab", rank = 2)]
fn gitlab_unsupported() -> WebhookResponse {
    WebhookResponse::BadRequest("unsupported content type".to_string())
}

#[utoipa::path(context_path = "/webhooks", responses(
    (status = 201, description = "Push ingested with newly created commits", body = WebhookAck)
))]
#[post("/bitbucket", format = "json", data = "<payload>", rank = 1)]
async fn bitbucket_json(db: &State<DB>, payload: Json<Value>) -> WebhookResponse {
    handle(db, Service::Bitbucket, payload.into_inner()).await
}

#[post("/bitbucket", format = "form", data = "<form>", rank = 2)]
async fn bitbucket_form(db: &State<DB>, form: Form<PayloadForm>) -> WebhookResponse {
    match form_payload(form.into_inner()) {
        Ok(raw) => handle(db, Service::Bitbucket, raw).await,
        Err(response) => response,
    }
}

#[post("/bitbucket", rank = 3)]
fn bitbucket_unsupported() -> WebhookResponse {
    WebhookResponse::BadRequest("unsupported content type".to_string())
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing webhook entrypoints", |rocket| async {
        rocket.mount(
            "/webhooks",
            rocket::routes![
                github_json,
                github_form,
                github_unsupported,
                gitlab_json,
                gitlab_unsupported,
                bitbucket_json,
                bitbucket_form,
                bitbucket_unsupported
            ],
        )
    })
}
