use askama::Template;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::dto::{CustomerForm, ValidationErrors};
use super::errors::CustomerError;
use super::services::{create_customer, delete_customer, get_customer, list_customers, update_customer};
use super::validation::image_too_large;
use super::views::{DetailPage, FormPage, IndexPage};
use crate::error::AppError;
use crate::images::services::UploadItem;
use crate::state::AppState;

const FLASH_COOKIE: &str = "flash";
const BODY_LIMIT: usize = 8 * 1024 * 1024; // 8MB

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/customers", get(index).post(store))
        .route("/customers/new", get(create_form))
        .route(
            "/customers/:id",
            get(show).put(update).delete(destroy).post(method_override),
        )
        .route("/customers/:id/edit", get(edit_form))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

// --- flash ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flash {
    Created,
    Updated,
    Deleted,
}

impl Flash {
    fn code(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::Created => "Customer created successfully.",
            Self::Updated => "Customer updated successfully.",
            Self::Deleted => "Customer deleted successfully.",
        }
    }

    fn read(headers: &HeaderMap) -> Option<Self> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().strip_prefix("flash="))
            .find_map(Self::from_code)
    }
}

/// 303 to the list, carrying a one-shot status message.
fn redirect_with(flash: Flash) -> Response {
    let cookie = format!(
        "{}={}; Path=/; Max-Age=60; HttpOnly; SameSite=Lax",
        FLASH_COOKIE,
        flash.code()
    );
    ([(header::SET_COOKIE, cookie)], Redirect::to("/customers")).into_response()
}

// --- form input ---

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}

/// A decoded customer form plus the `_method` override, if one was sent.
#[derive(Debug, Default)]
struct Submission {
    form: CustomerForm,
    method: Option<String>,
    /// The body hit the size limit; parts after that point were not read.
    oversized: bool,
}

async fn read_part(mp: &mut Multipart, sub: &mut Submission) -> Result<bool, MultipartError> {
    let Some(field) = mp.next_field().await? else {
        return Ok(false);
    };
    let Some(name) = field.name().map(|s| s.to_string()) else {
        return Ok(true);
    };
    match name.as_str() {
        "image" => {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let body = field.bytes().await?;
            // browsers send an empty part when no file was chosen
            if !(file_name.is_empty() && body.is_empty()) {
                sub.form.image = Some(UploadItem { body, file_name });
            }
        }
        "_method" => sub.method = Some(field.text().await?.trim().to_ascii_uppercase()),
        _ => {
            let value = field.text().await?;
            sub.form.set(&name, value);
        }
    }
    Ok(true)
}

/// Reads every part of a customer form. A body over the limit is reported
/// through `oversized` so the form can be shown again with an image error.
async fn read_form(mut mp: Multipart) -> Result<Submission, AppError> {
    let mut sub = Submission::default();
    loop {
        match read_part(&mut mp, &mut sub).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                warn!(limit = BODY_LIMIT, "customer form exceeded body limit");
                sub.oversized = true;
                sub.form.image = None;
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(sub)
}

fn oversized_errors() -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    image_too_large(&mut errors);
    errors
}

fn unprocessable(page: FormPage) -> Result<Response, AppError> {
    Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(page.render()?)).into_response())
}

// --- handlers ---

#[instrument(skip(state, headers))]
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let customers = list_customers(&state).await?;
    let flash = Flash::read(&headers);
    let page = IndexPage::new(&customers, flash.map(Flash::message));
    let body = Html(page.render()?);

    if flash.is_some() {
        let clear = format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", FLASH_COOKIE);
        return Ok(([(header::SET_COOKIE, clear)], body).into_response());
    }
    Ok(body.into_response())
}

#[instrument]
pub async fn create_form() -> Result<Html<String>, AppError> {
    let page = FormPage::create(&CustomerForm::default(), &ValidationErrors::default());
    Ok(Html(page.render()?))
}

#[instrument(skip(state, mp))]
pub async fn store(State(state): State<AppState>, mp: Multipart) -> Result<Response, AppError> {
    let Submission { form, oversized, .. } = read_form(mp).await?;
    if oversized {
        return unprocessable(FormPage::create(&form, &oversized_errors()));
    }
    match create_customer(&state, form.clone()).await {
        Ok(_) => Ok(redirect_with(Flash::Created)),
        Err(CustomerError::Validation(errors)) => {
            debug!(fields = ?errors.fields(), "create rejected");
            unprocessable(FormPage::create(&form, &errors))
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Html<String>, AppError> {
    let customer = get_customer(&state, parse_id(&id)?).await?;
    Ok(Html(DetailPage::from(&customer).render()?))
}

#[instrument(skip(state))]
pub async fn edit_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let customer = get_customer(&state, parse_id(&id)?).await?;
    let form = CustomerForm::from_customer(&customer);
    let page = FormPage::edit(&customer, &form, &ValidationErrors::default());
    Ok(Html(page.render()?))
}

#[instrument(skip(state, mp))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mp: Multipart,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let sub = read_form(mp).await?;
    apply_update(&state, id, sub).await
}

#[instrument(skip(state))]
pub async fn destroy(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    apply_destroy(&state, parse_id(&id)?).await
}

/// HTML forms can only POST; `_method` selects the real verb.
#[instrument(skip(state, mp))]
pub async fn method_override(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mp: Multipart,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let sub = read_form(mp).await?;
    match sub.method.as_deref() {
        Some("PUT") | Some("PATCH") => apply_update(&state, id, sub).await,
        Some("DELETE") => apply_destroy(&state, id).await,
        None if sub.oversized => Err(AppError::PayloadTooLarge),
        _ => Err(AppError::MethodNotAllowed),
    }
}

async fn apply_update(state: &AppState, id: Uuid, sub: Submission) -> Result<Response, AppError> {
    let form = sub.form;
    if sub.oversized {
        let customer = get_customer(state, id).await?;
        return unprocessable(FormPage::edit(&customer, &form, &oversized_errors()));
    }
    match update_customer(state, id, form.clone()).await {
        Ok(_) => Ok(redirect_with(Flash::Updated)),
        Err(CustomerError::Validation(errors)) => {
            debug!(%id, fields = ?errors.fields(), "update rejected");
            let customer = get_customer(state, id).await?;
            unprocessable(FormPage::edit(&customer, &form, &errors))
        }
        Err(e) => Err(e.into()),
    }
}

async fn apply_destroy(state: &AppState, id: Uuid) -> Result<Response, AppError> {
    delete_customer(state, id).await?;
    Ok(redirect_with(Flash::Deleted))
}

#[cfg(test)]
mod handler_tests {
    use super::*;
    use crate::app::build_app;
    use crate::customers::repo::CustomerRepository;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "customer-desk-boundary";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn form_request(method: &str, uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn valid_fields<'a>(email: &'a str, phone: &'a str) -> Vec<(&'a str, &'a str)> {
        vec![
            ("first_name", "Ana"),
            ("last_name", "Lee"),
            ("date_of_birth", "1990-04-01"),
            ("email", email),
            ("phone", phone),
            ("account_number", "12345"),
            ("about", "Prefers email."),
        ]
    }

    async fn body_text(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn seed(state: &AppState) -> Uuid {
        let mut form = CustomerForm::default();
        for (name, value) in valid_fields("seed@x.com", "5550000000") {
            form.set(name, value.to_string());
        }
        create_customer(state, form).await.unwrap().id
    }

    #[tokio::test]
    async fn index_renders_empty_list() {
        let app = build_app(AppState::fake());
        let resp = app.oneshot(get("/customers")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("No customers yet."));
    }

    #[tokio::test]
    async fn store_redirects_with_flash_and_index_shows_it_once() {
        let state = AppState::fake();
        let app = build_app(state.clone());

        let body = multipart_body(&valid_fields("ana@x.com", "5551234567"), Some(("me.png", PNG)));
        let resp = app.clone().oneshot(form_request("POST", "/customers", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/customers");
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("flash=created;"));

        let listed = state.customers.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].image.as_deref().unwrap().starts_with("/uploads/"));

        let req = Request::builder()
            .uri("/customers")
            .header(header::COOKIE, "theme=dark; flash=created")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cleared = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cleared.contains("Max-Age=0"));
        let html = body_text(resp).await;
        assert!(html.contains("Customer created successfully."));
        assert!(html.contains("ana@x.com"));
    }

    #[tokio::test]
    async fn store_without_file_part_uses_placeholder() {
        let state = AppState::fake();
        let app = build_app(state.clone());

        let body = multipart_body(&valid_fields("ana@x.com", "5551234567"), Some(("", &b""[..])));
        let resp = app.oneshot(form_request("POST", "/customers", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let listed = state.customers.list().await.unwrap();
        assert_eq!(listed[0].image, None);
        assert_eq!(listed[0].image_path(), "/default-images/ben.png");
    }

    #[tokio::test]
    async fn empty_submission_rerenders_form_with_422() {
        let state = AppState::fake();
        let app = build_app(state.clone());

        let resp = app
            .oneshot(form_request("POST", "/customers", multipart_body(&[], None)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let html = body_text(resp).await;
        assert!(html.contains("The first name field is required."));
        assert!(html.contains("The email field is required."));
        assert!(state.customers.list().await.unwrap().is_empty());
    }

    fn oversized_image() -> Vec<u8> {
        let mut big = PNG.to_vec();
        big.resize(BODY_LIMIT + 1, 0);
        big
    }

    #[tokio::test]
    async fn image_over_body_limit_rerenders_form_with_422() {
        let state = AppState::fake();
        let app = build_app(state.clone());

        let big = oversized_image();
        let body = multipart_body(&valid_fields("ana@x.com", "5551234567"), Some(("huge.png", &big[..])));
        let resp = app.oneshot(form_request("POST", "/customers", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let html = body_text(resp).await;
        assert!(html.contains("The image field must not be greater than 2048 kilobytes."));
        assert!(html.contains(r#"value="ana@x.com""#));
        assert!(state.customers.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_over_body_limit_on_update_rerenders_edit_form() {
        let state = AppState::fake();
        let id = seed(&state).await;
        let app = build_app(state.clone());

        let big = oversized_image();
        let mut fields = vec![("_method", "PUT")];
        fields.extend(valid_fields("seed@x.com", "5550000000"));
        fields[1] = ("first_name", "Changed");
        let body = multipart_body(&fields, Some(("huge.png", &big[..])));
        let resp = app
            .oneshot(form_request("POST", &format!("/customers/{id}"), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_text(resp)
            .await
            .contains("The image field must not be greater than 2048 kilobytes."));

        let stored = state.customers.find(id).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "Ana");
    }

    #[tokio::test]
    async fn rejected_form_keeps_submitted_values() {
        let app = build_app(AppState::fake());
        let mut fields = valid_fields("not-an-email", "5551234567");
        fields[0] = ("first_name", "Beatrix");

        let resp = app
            .oneshot(form_request("POST", "/customers", multipart_body(&fields, None)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let html = body_text(resp).await;
        assert!(html.contains("The email field must be a valid email address."));
        assert!(html.contains(r#"value="Beatrix""#));
    }

    #[tokio::test]
    async fn unknown_or_malformed_ids_are_404() {
        let app = build_app(AppState::fake());
        let missing = Uuid::new_v4();

        for uri in [
            "/customers/not-a-uuid".to_string(),
            format!("/customers/{missing}"),
            format!("/customers/{missing}/edit"),
        ] {
            let resp = app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        }

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/customers/{missing}"))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn show_and_edit_render_existing_customer() {
        let state = AppState::fake();
        let id = seed(&state).await;
        let app = build_app(state);

        let resp = app.clone().oneshot(get(&format!("/customers/{id}"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("seed@x.com"));

        let resp = app.oneshot(get(&format!("/customers/{id}/edit"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_text(resp).await;
        assert!(html.contains(r#"value="seed@x.com""#));
        assert!(html.contains(r#"name="_method" value="PUT""#));
    }

    #[tokio::test]
    async fn put_updates_and_redirects() {
        let state = AppState::fake();
        let id = seed(&state).await;
        let app = build_app(state.clone());

        let mut fields = valid_fields("seed@x.com", "5550000000");
        fields[0] = ("first_name", "Anabel");
        let resp = app
            .oneshot(form_request("PUT", &format!("/customers/{id}"), multipart_body(&fields, None)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(resp.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .starts_with("flash=updated;"));

        let stored = state.customers.find(id).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "Anabel");
    }

    #[tokio::test]
    async fn invalid_update_rerenders_edit_form() {
        let state = AppState::fake();
        let id = seed(&state).await;
        let app = build_app(state.clone());

        let mut fields = valid_fields("seed@x.com", "5550000000");
        fields[4] = ("phone", "12ab");
        let resp = app
            .oneshot(form_request("PUT", &format!("/customers/{id}"), multipart_body(&fields, None)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let html = body_text(resp).await;
        assert!(html.contains("The phone field must be a number."));
        assert!(html.contains(&format!("/customers/{id}")));

        let stored = state.customers.find(id).await.unwrap().unwrap();
        assert_eq!(stored.phone, "5550000000");
    }

    #[tokio::test]
    async fn post_with_method_override_deletes() {
        let state = AppState::fake();
        let id = seed(&state).await;
        let app = build_app(state.clone());

        let body = multipart_body(&[("_method", "DELETE")], None);
        let resp = app
            .clone()
            .oneshot(form_request("POST", &format!("/customers/{id}"), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(resp.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .starts_with("flash=deleted;"));

        let resp = app.oneshot(get(&format!("/customers/{id}"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(state.customers.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_with_method_override_updates() {
        let state = AppState::fake();
        let id = seed(&state).await;
        let app = build_app(state.clone());

        let mut fields = valid_fields("seed@x.com", "5550000000");
        fields.push(("_method", "put"));
        fields[1] = ("last_name", "Leeds");
        let resp = app
            .oneshot(form_request("POST", &format!("/customers/{id}"), multipart_body(&fields, None)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let stored = state.customers.find(id).await.unwrap().unwrap();
        assert_eq!(stored.last_name, "Leeds");
    }

    #[tokio::test]
    async fn post_without_override_is_rejected() {
        let state = AppState::fake();
        let id = seed(&state).await;
        let app = build_app(state.clone());

        let resp = app
            .oneshot(form_request("POST", &format!("/customers/{id}"), multipart_body(&[], None)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(state.customers.list().await.unwrap().len(), 1);
    }

    #[test]
    fn flash_cookie_is_read_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "a=1; flash=deleted; b=2".parse().unwrap());
        assert_eq!(Flash::read(&headers), Some(Flash::Deleted));

        headers.insert(header::COOKIE, "flash=bogus".parse().unwrap());
        assert_eq!(Flash::read(&headers), None);
    }
}
