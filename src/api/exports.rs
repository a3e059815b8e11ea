use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::api::batches::current_run;
use crate::api::errors::ApiError;
use crate::api::guards::CurrentSchool;
use crate::core::state::AppState;
use crate::schemas::batch::SortQuery;
use crate::services::export::{self, artifact_name, ARCHIVE_FILE_NAME};
use crate::services::result_sorter;

const SUMMARY_FILE_NAME: &str = "summary.csv";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/current/export/summary.csv", get(summary_csv))
        .route("/current/export/archive", get(archive))
        .route("/current/scripts/:index/export/pdf", get(script_pdf))
}

async fn summary_csv(
    State(state): State<AppState>,
    CurrentSchool(school): CurrentSchool,
    Query(query): Query<SortQuery>,
) -> Result<Response, ApiError> {
    let run = current_run(&state, &school.id).await?;
    let sorted = result_sorter::sort_outcomes(&run.outcomes, query.sort, query.direction);
    let body = export::export_summary_csv(sorted);

    Ok(attachment(body.into_bytes(), "text/csv; charset=utf-8", SUMMARY_FILE_NAME))
}

async fn archive(
    State(state): State<AppState>,
    CurrentSchool(school): CurrentSchool,
    Query(query): Query<SortQuery>,
) -> Result<Response, ApiError> {
    let run = current_run(&state, &school.id).await?;
    let sorted = result_sorter::sort_outcomes(&run.outcomes, query.sort, query.direction);
    let bytes = export::export_batch(sorted)?;

    tracing::info!(batch_id = %run.id, school_id = %school.id, "Results archive downloaded");
    Ok(attachment(bytes, "application/zip", ARCHIVE_FILE_NAME))
}

async fn script_pdf(
    Path(index): Path<usize>,
    State(state): State<AppState>,
    CurrentSchool(school): CurrentSchool,
) -> Result<Response, ApiError> {
    let run = current_run(&state, &school.id).await?;
    let outcome = run.outcome(index).ok_or_else(|| {
        ApiError::NotFound(format!("Script {index} was not found in the current batch."))
    })?;

    let bytes = export::export_single(outcome)?;
    Ok(attachment(bytes, "application/pdf", &artifact_name(outcome.name())))
}

fn attachment(body: Vec<u8>, content_type: &'static str, filename: &str) -> Response {
    let safe_name: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' || c == ' ' { c } else { '_' })
        .collect();

    let mut response = (StatusCode::OK, body).into_response();
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{safe_name}\""))
    {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, disposition);
    }
    response
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use axum::body::to_bytes;
    use axum::http::{header, Method, StatusCode};
    use tower::ServiceExt;

    use crate::services::export::SUMMARY_HEADER;
    use crate::test_support::{
        json_request, multipart_request, read_json, setup_test_context_with, signed_up_school,
        ScriptedMarker, TestContext, UploadPart,
    };

    async fn marked_batch(ctx: &TestContext, token: &str) {
        let parts = [
            UploadPart::file("question_paper", "paper.pdf", "application/pdf", b"%PDF paper"),
            UploadPart::file("scripts", "Thabo.png", "image/png", b"png"),
            UploadPart::file("scripts", "Lerato.jpg", "image/jpeg", b"jpg"),
            UploadPart::file("scripts", "Sipho.pdf", "application/pdf", b"%PDF sipho"),
        ];
        let response = ctx
            .app
            .clone()
            .oneshot(multipart_request("/api/v1/batches", token, &parts))
            .await
            .expect("batch");
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn get(ctx: &TestContext, uri: &str, token: &str) -> axum::response::Response {
        ctx.app
            .clone()
            .oneshot(json_request(Method::GET, uri, Some(token), None))
            .await
            .expect("response")
    }

    fn context_marker() -> ScriptedMarker {
        ScriptedMarker::new()
            .succeed("Thabo.png", 45.0)
            .succeed("Lerato.jpg", 80.0)
            .fail_malformed("Sipho.pdf")
    }

    #[tokio::test]
    async fn summary_csv_lists_marked_scripts_in_requested_order() {
        let ctx = setup_test_context_with(context_marker()).await;
        let token = signed_up_school(&ctx.app, "123456789").await;
        marked_batch(&ctx, &token).await;

        let response = get(
            &ctx,
            "/api/v1/batches/current/export/summary.csv?sort=score&direction=desc",
            &token,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let lines: Vec<&str> = text.split("\r\n").filter(|line| !line.is_empty()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SUMMARY_HEADER);
        assert!(lines[1].starts_with("Lerato.jpg,80,100,80.0,"));
        assert!(lines[2].starts_with("Thabo.png,45,100,45.0,"));
    }

    #[tokio::test]
    async fn archive_contains_one_pdf_per_marked_script() {
        let ctx = setup_test_context_with(context_marker()).await;
        let token = signed_up_school(&ctx.app, "123456789").await;
        marked_batch(&ctx, &token).await;

        let response = get(&ctx, "/api/v1/batches/current/export/archive", &token).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"All-Script-Results.zip\""
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(body.to_vec())).expect("zip");
        let mut names: Vec<String> =
            (0..archive.len()).map(|i| archive.by_index(i).unwrap().name().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["Lerato-results.pdf", "Thabo-results.pdf"]);
    }

    #[tokio::test]
    async fn single_pdf_export_by_input_position() {
        let ctx = setup_test_context_with(context_marker()).await;
        let token = signed_up_school(&ctx.app, "123456789").await;
        marked_batch(&ctx, &token).await;

        let response = get(&ctx, "/api/v1/batches/current/scripts/1/export/pdf", &token).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Lerato-results.pdf\""
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"%PDF-"));

        let response = get(&ctx, "/api/v1/batches/current/scripts/2/export/pdf", &token).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            read_json(response).await["detail"],
            "There are no results to export for 'Sipho.pdf'."
        );

        let response = get(&ctx, "/api/v1/batches/current/scripts/9/export/pdf", &token).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn archive_with_only_failures_is_unprocessable() {
        let marker = ScriptedMarker::new().fail_malformed("a.png");
        let ctx = setup_test_context_with(marker).await;
        let token = signed_up_school(&ctx.app, "123456789").await;

        let parts = [
            UploadPart::file("question_paper", "paper.png", "image/png", b"png"),
            UploadPart::file("scripts", "a.png", "image/png", b"png"),
        ];
        ctx.app
            .clone()
            .oneshot(multipart_request("/api/v1/batches", &token, &parts))
            .await
            .expect("batch");

        let response = get(&ctx, "/api/v1/batches/current/export/archive", &token).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn exports_without_a_batch_are_not_found() {
        let ctx = setup_test_context_with(ScriptedMarker::new()).await;
        let token = signed_up_school(&ctx.app, "123456789").await;

        let response = get(&ctx, "/api/v1/batches/current/export/summary.csv", &token).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
