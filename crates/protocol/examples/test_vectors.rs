//! Generate JSON samples of every response body for client interop testing.
//!
//! Run with: cargo run --package protocol --example test_vectors

use chrono::{TimeZone, Utc};
use protocol::messages::*;

fn main() {
    let modified = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    // Test vector 1: listing with one entry
    let listing = ListResponse::new(
        vec![ListingEntry {
            name: "q1.pdf".to_string(),
            path: "reports/q1.pdf".to_string(),
            file_type: "pdf".to_string(),
            size: 2048,
            modified,
        }],
        false,
    );
    print_test_vector("list", &listing);

    // Test vector 2: empty, truncated listing
    print_test_vector("list_truncated", &ListResponse::new(Vec::new(), true));

    // Test vector 3: traversal rejection
    print_test_vector(
        "error_traversal",
        &ErrorResponse::new(ErrorCode::Traversal, "path traversal rejected: ../../etc/passwd"),
    );

    // Test vector 4: not found with case suggestion
    print_test_vector(
        "error_not_found_suggestion",
        &ErrorResponse::new(ErrorCode::NotFound, "file not found: reports/Q1.pdf")
            .with_suggestion(Some("q1.pdf".to_string())),
    );

    // Test vector 5: health
    print_test_vector(
        "health",
        &HealthResponse {
            status: HEALTH_OK.to_string(),
            timestamp: modified,
        },
    );
}

fn print_test_vector<T: serde::Serialize>(name: &str, value: &T) {
    match to_json(value) {
        Ok(json) => println!("{}: {}", name, json),
        Err(e) => eprintln!("{}: failed to encode: {}", name, e),
    }
}
