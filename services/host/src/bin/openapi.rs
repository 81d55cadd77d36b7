//! services/host/src/bin/openapi.rs
//!
//! Writes the host's OpenAPI document so UI clients can be generated from it.
//! Usage: `openapi [OUTPUT]` (defaults to `openapi.json`).

use host_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn document() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = "Unveil host".to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    let doc = document();
    std::fs::write(&output, doc.to_pretty_json()?)?;
    println!(
        "Wrote {} paths and {} schemas to {}",
        doc.paths.paths.len(),
        doc.components.as_ref().map_or(0, |c| c.schemas.len()),
        output
    );
    Ok(())
}
