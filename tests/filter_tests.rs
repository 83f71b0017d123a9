//! Query-string filters, sorting and pagination on collections

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::Value as Json;

mod equality_tests {
    use super::*;

    #[tokio::test]
    async fn test_repeated_equality_is_or() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users")
            .add_query_param("name", "Ann")
            .add_query_param("name(1)", "Cy")
            .await;
        response.assert_status_ok();
        assert_eq!(names(&response.json()), vec!["Ann", "Cy"]);
    }

    #[tokio::test]
    async fn test_bracketed_list() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users")
            .add_query_param("id", "[2,42]")
            .await;
        assert_eq!(names(&response.json()), vec!["Bob", "Dee"]);
    }

    #[tokio::test]
    async fn test_null_equality() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users")
            .add_query_param("email", "null")
            .await;
        assert_eq!(names(&response.json()), vec!["Cy", "Dee"]);
    }

    #[tokio::test]
    async fn test_not_equal_excludes_every_value() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users")
            .add_query_param("name!", "Ann,Bob")
            .await;
        assert_eq!(names(&response.json()), vec!["Cy", "Dee"]);
    }

    #[tokio::test]
    async fn test_state_filter_includes_deleted() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users")
            .add_query_param("state", "-1")
            .await;
        response.assert_status_ok();
        assert_eq!(names(&response.json()), vec!["Eve"]);
        assert_eq!(response.headers()["X-Collection-Count"], "4");
    }
}

mod operator_tests {
    use super::*;

    #[tokio::test]
    async fn test_range_filters_are_anded() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users")
            .add_query_param("age>", "18")
            .await;
        assert_eq!(names(&response.json()), vec!["Ann", "Cy", "Dee"]);

        let response = fixture
            .get("/v1/users")
            .add_query_param("age>", "18")
            .add_query_param("age<", "40")
            .await;
        assert_eq!(names(&response.json()), vec!["Ann", "Dee"]);
    }

    #[tokio::test]
    async fn test_text_glyphs() {
        let fixture = Fixture::new();

        let starts: Json = fixture
            .get("/v1/users")
            .add_query_param("name^", "a")
            .await
            .json();
        assert_eq!(names(&starts), vec!["Ann"]);

        let ends: Json = fixture
            .get("/v1/users")
            .add_query_param("name$", "y")
            .await
            .json();
        assert_eq!(names(&ends), vec!["Cy"]);

        let contains: Json = fixture
            .get("/v1/users")
            .add_query_param("email*", "example")
            .await
            .json();
        assert_eq!(names(&contains), vec!["Ann", "Bob"]);
    }

    #[tokio::test]
    async fn test_regex_and_negated_regex() {
        let fixture = Fixture::new();

        let matching: Json = fixture
            .get("/v1/users")
            .add_query_param("name~", "^[AB]")
            .await
            .json();
        assert_eq!(names(&matching), vec!["Ann", "Bob"]);

        let negated: Json = fixture
            .get("/v1/users")
            .add_query_param("name~", "!^[AB]")
            .await
            .json();
        assert_eq!(names(&negated), vec!["Cy", "Dee"]);
    }

    #[tokio::test]
    async fn test_distance_filter() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/cities")
            .add_query_param("location@", "52.0,4.3,20")
            .await;
        response.assert_status_ok();
        assert_eq!(names(&response.json()), vec!["Delft"]);

        let response = fixture
            .get("/v1/cities")
            .add_query_param("location@", "50.0,3.0,500")
            .await;
        assert_eq!(names(&response.json()), vec!["Delft", "Paris"]);
    }

    #[tokio::test]
    async fn test_invalid_regex_is_rejected() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users")
            .add_query_param("name~", "(")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Json = response.json();
        assert_eq!(body["errorCode"], "INVALID_FILTER");
    }

    #[tokio::test]
    async fn test_malformed_distance_is_rejected() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/cities")
            .add_query_param("location@", "52.0,4.3")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Json = response.json();
        assert_eq!(body["errorCode"], "INVALID_FILTER");
    }
}

mod sort_tests {
    use super::*;

    #[tokio::test]
    async fn test_sort_and_sort_desc() {
        let fixture = Fixture::new();

        let ascending: Json = fixture
            .get("/v1/users")
            .add_query_param("sort", "age")
            .await
            .json();
        assert_eq!(names(&ascending), vec!["Bob", "Ann", "Dee", "Cy"]);

        let descending: Json = fixture
            .get("/v1/users")
            .add_query_param("sortDesc", "name")
            .await
            .json();
        assert_eq!(names(&descending), vec!["Dee", "Cy", "Bob", "Ann"]);
    }

    #[tokio::test]
    async fn test_multisort() {
        let fixture = Fixture::new();

        let response: Json = fixture
            .get("/v1/users")
            .add_query_param("multisort", ">age,>name")
            .await
            .json();
        assert_eq!(names(&response), vec!["Cy", "Dee", "Ann", "Bob"]);
    }

    #[tokio::test]
    async fn test_aftersort_runs_after_pagination() {
        let fixture = Fixture::new();

        // the page is cut by the storage sort, then reordered in memory
        let response = fixture
            .get("/v1/users")
            .add_query_param("sortDesc", "age")
            .add_query_param("limit", 3)
            .add_query_param("aftersort", "name")
            .await;
        response.assert_status_ok();
        assert_eq!(names(&response.json()), vec!["Ann", "Cy", "Dee"]);
    }

    #[tokio::test]
    async fn test_sort_then_paginate() {
        let fixture = Fixture::new();

        let response = fixture
            .get("/v1/users")
            .add_query_param("sortDesc", "name")
            .add_query_param("limit", 2)
            .add_query_param("offset", 1)
            .await;
        assert_eq!(names(&response.json()), vec!["Cy", "Bob"]);
        assert_eq!(response.headers()["X-Collection-Count"], "4");
    }
}
