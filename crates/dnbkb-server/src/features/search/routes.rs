//! Search routes

use axum::{extract::State, routing::post, Json, Router};

use super::commands::{search_catalog::handle as handle_search, SearchCatalogCommand};
use crate::catalog::SearchResponse;
use crate::error::AppError;
use crate::features::AppState;

/// Create search routes
pub fn search_routes() -> Router<AppState> {
    Router::new().route("/", post(search_catalog))
}

/// Search the catalog and reconcile the hits
///
/// POST /search
async fn search_catalog(
    State(state): State<AppState>,
    Json(command): Json<SearchCatalogCommand>,
) -> Result<Json<SearchResponse>, AppError> {
    let response = handle_search(&state, command).await?;
    Ok(Json(response))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::CatalogStore;
    use crate::features::shared::test_helpers::{post_json, send, TestApp};
    use crate::testing::{sru_response, MarcRecordBuilder};
    use axum::http::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_reconciles_hits() {
        let server = MockServer::start().await;
        let record = MarcRecordBuilder::new("1001")
            .datafield("245", &[("a", "Faust /"), ("b", "eine Tragödie")])
            .datafield("264", &[("c", "1986")])
            .datafield("100", &[("a", "Goethe, Johann Wolfgang von")])
            .datafield(
                "856",
                &[("u", "https://d-nb.info/1001/04"), ("3", "Inhaltsverzeichnis")],
            )
            .build();
        Mock::given(method("GET"))
            .and(query_param("query", "tit=Faust"))
            .and(query_param("startRecord", "3"))
            .and(query_param("maximumRecords", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sru_response(17, &[record, "<broken".to_string()])),
            )
            .mount(&server)
            .await;

        let app = TestApp::with_sru_base_url(&format!("{}/sru/dnb", server.uri()));
        let (status, body) = send(
            app.router(),
            post_json(
                "/search",
                &json!({ "cql": "tit=Faust", "start_record": 3, "maximum_records": 2 }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["number_of_records"], 17);
        assert_eq!(
            body["hits"],
            json!([{
                "idn": "1001",
                "title": "Faust eine Tragödie",
                "year": 1986,
                "creators": ["Goethe, Johann Wolfgang von"],
                "links_count": 1
            }])
        );
        assert_eq!(app.store.list_links("1001").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_rejects_bad_paging() {
        let app = TestApp::new();
        for body in [
            json!({ "cql": "tit=x", "start_record": 0 }),
            json!({ "cql": "tit=x", "maximum_records": 0 }),
            json!({ "cql": "tit=x", "maximum_records": 101 }),
            json!({ "cql": "  " }),
        ] {
            let (status, response) = send(app.router(), post_json("/search", &body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(response["error"]["status"], 400);
        }
        assert_eq!(app.store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_search_upstream_failure_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let app = TestApp::with_sru_base_url(&server.uri());
        let (status, body) =
            send(app.router(), post_json("/search", &json!({ "cql": "tit=x" }))).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["status"], 502);
    }
}
