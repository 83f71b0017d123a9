//! Expansion, field selection and HTTP-level response handling

mod common;

use axum::http::{HeaderValue, Method, StatusCode, header};
use common::*;
use serde_json::{Value as Json, json};

fn keys(value: &Json) -> Vec<String> {
    let mut keys: Vec<String> = value
        .as_object()
        .expect("expected an object")
        .keys()
        .cloned()
        .collect();
    keys.sort();
    keys
}

mod expand_tests {
    use super::*;

    #[tokio::test]
    async fn test_expand_references() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users/1")
            .add_query_param("expand", "friends")
            .await;
        response.assert_status_ok();

        let body: Json = response.json();
        assert_eq!(body["friends"][0]["name"], "Bob");
        assert_eq!(body["friends"][1]["name"], "Cy");
        assert_eq!(body["friends"][0]["href"], href("users", 2));
        // one level only: nested references stay hrefs
        assert_eq!(body["friends"][0]["city"], href("cities", 2));
        assert_eq!(body["city"], href("cities", 1));
        assert_eq!(fixture.users.connected_fetches(), 1);
    }

    #[tokio::test]
    async fn test_nested_expand() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users/1")
            .add_query_param("expand", "friends(city),city")
            .await;
        response.assert_status_ok();

        let body: Json = response.json();
        assert_eq!(body["friends"][0]["city"]["name"], "Paris");
        assert_eq!(body["friends"][1]["city"]["name"], "Delft");
        assert_eq!(body["city"]["name"], "Delft");
        assert_eq!(fixture.users.connected_fetches(), 1);
        // friends(city) and city are loaded as separate batches
        assert_eq!(fixture.cities.connected_fetches(), 2);
    }

    #[tokio::test]
    async fn test_expand_on_collection_batches_per_path() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users")
            .add_query_param("expand", "city")
            .await;
        response.assert_status_ok();

        let body: Json = response.json();
        assert_eq!(body[0]["city"]["name"], "Delft");
        assert_eq!(body[1]["city"]["name"], "Paris");
        assert_eq!(body[3]["city"], Json::Null);
        assert_eq!(fixture.cities.connected_fetches(), 1);
    }
}

mod object_tests {
    use super::*;

    #[tokio::test]
    async fn test_text_objects_become_strings() {
        let fixture = Fixture::new();

        let response = fixture.get("/v1/things/texts").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Json>(), json!(["hi", "hi"]));
        assert_eq!(response.headers()["X-Collection-Count"], "2");
    }

    #[tokio::test]
    async fn test_integer_objects_become_numbers() {
        let fixture = Fixture::new();

        let response = fixture.get("/v1/things/counts").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Json>(), json!([1, 2]));
    }

    #[tokio::test]
    async fn test_array_object_becomes_map() {
        let fixture = Fixture::new();

        let response = fixture.get("/v1/things/pair").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Json>(), json!({"left": 1, "right": "r"}));
    }

    #[tokio::test]
    async fn test_nested_object_reduced_on_output() {
        let fixture = Fixture::new();

        let response = fixture.get("/v1/things/wrapped").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Json>(), json!({"label": "hi"}));
    }

    #[tokio::test]
    async fn test_opaque_object_is_unrepresentable() {
        let fixture = Fixture::new();

        for path in ["/v1/things/opaque", "/v1/things/hidden"] {
            let response = fixture.get(path).await;
            response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
            let body: Json = response.json();
            assert_eq!(body["errorCode"], "UNREPRESENTABLE");
        }
    }
}

mod fields_tests {
    use super::*;

    #[tokio::test]
    async fn test_fields_on_collection() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users")
            .add_query_param("fields", "id,name")
            .await;
        response.assert_status_ok();

        let body: Json = response.json();
        for item in body.as_array().expect("array body") {
            assert_eq!(keys(item), vec!["href", "id", "name"]);
        }
    }

    #[tokio::test]
    async fn test_fields_into_expanded_values() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users/1")
            .add_query_param("fields", "name,friends(name)")
            .add_query_param("expand", "friends")
            .await;
        response.assert_status_ok();

        let body: Json = response.json();
        assert_eq!(keys(&body), vec!["friends", "href", "name"]);
        assert_eq!(
            body["friends"],
            json!([
                {"name": "Bob", "href": href("users", 2)},
                {"name": "Cy", "href": href("users", 3)}
            ])
        );
    }

    #[tokio::test]
    async fn test_leaf_field_keeps_expanded_subtree() {
        let fixture = Fixture::new();

        let body: Json = fixture
            .get("/v1/users/1")
            .add_query_param("fields", "friends")
            .add_query_param("expand", "friends")
            .await
            .json();
        assert_eq!(keys(&body), vec!["friends", "href"]);
        assert_eq!(body["friends"][0]["age"], 17);
    }
}

mod header_tests {
    use super::*;

    #[tokio::test]
    async fn test_security_and_cors_headers() {
        let fixture = Fixture::new();

        let response = fixture.get("/v1/users").await;
        let headers = response.headers();
        assert_eq!(headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(headers["X-Frame-Options"], "SAMEORIGIN");
        assert_eq!(headers["X-Content-Type-Options"], "nosniff");
        assert_eq!(headers["Referrer-Policy"], "no-referrer");
        assert_eq!(
            headers["Strict-Transport-Security"],
            "max-age=31536000; includeSubDomains"
        );
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");

        let exposed = headers["Access-Control-Expose-Headers"]
            .to_str()
            .expect("ascii header");
        assert!(exposed.contains("X-Collection-Count"));
        assert!(exposed.contains("X-Collection-Limit"));
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let fixture = Fixture::new();

        let response = fixture.server.method(Method::OPTIONS, "/v1/users").await;
        response.assert_status(StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()["Access-Control-Allow-Methods"],
            "GET,POST,PUT,DELETE,OPTIONS"
        );
        let allowed = response.headers()["Access-Control-Allow-Headers"]
            .to_str()
            .expect("ascii header");
        assert!(allowed.contains("If-None-Match"));
        assert!(response.text().is_empty());
    }

    #[tokio::test]
    async fn test_etag_not_modified() {
        let fixture = Fixture::new();

        let first = fixture.get("/v1/users/1").await;
        first.assert_status_ok();
        let etag = first.headers()[header::ETAG]
            .to_str()
            .expect("ascii etag")
            .to_string();
        assert!(etag.starts_with('"') && etag.ends_with('"'));

        let again = fixture.get("/v1/users/1").await;
        assert_eq!(again.headers()[header::ETAG], etag.as_str());

        let cached = fixture
            .get("/v1/users/1")
            .add_header(
                header::IF_NONE_MATCH,
                HeaderValue::from_str(&etag).expect("valid etag"),
            )
            .await;
        cached.assert_status(StatusCode::NOT_MODIFIED);
        assert!(cached.text().is_empty());
    }

    #[tokio::test]
    async fn test_etag_with_gzip_marker_matches() {
        let fixture = Fixture::new();

        let etag = fixture.get("/v1/users/2").await.headers()[header::ETAG]
            .to_str()
            .expect("ascii etag")
            .to_string();
        let gzipped = format!("{}-gzip\"", &etag[..etag.len() - 1]);

        let cached = fixture
            .get("/v1/users/2")
            .add_header(
                header::IF_NONE_MATCH,
                HeaderValue::from_str(&gzipped).expect("valid etag"),
            )
            .await;
        cached.assert_status(StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_etag_changes_with_content() {
        let fixture = Fixture::new();

        let before = fixture.get("/v1/users/2").await.headers()[header::ETAG].clone();
        fixture
            .put("/v1/users/2")
            .json(&json!({"name": "Robert"}))
            .await
            .assert_status_ok();

        let response = fixture
            .get("/v1/users/2")
            .add_header(header::IF_NONE_MATCH, before.clone())
            .await;
        response.assert_status_ok();
        assert_ne!(response.headers()[header::ETAG], before);
    }

    #[tokio::test]
    async fn test_memory_guard_below_ceiling() {
        let fixture = Fixture::with_memory_usage(50);

        fixture.get("/v1/users").await.assert_status_ok();
    }
}
