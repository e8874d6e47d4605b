//! Demonstrates building a document in an oversized pool and then shrinking it.
//!
//! Run with `RUST_LOG=trace` to see the pool report what it does.

use json_pool::{JsonDocument, JsonString, Node, Value};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), json_pool::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== JsonPool Shrink To Fit Example ===");
    println!();

    // We do not know how large the document will get, so start big.
    let mut document = JsonDocument::new(64 * 1024);

    let readings = document.insert(Node::Root, JsonString::linked("readings"), Value::Array)?;

    for hour in 0..24 {
        let reading = document.add(readings, Value::Object)?;
        document.insert(reading, JsonString::linked("hour"), Value::Integer(hour))?;

        let label = format!("reading at {hour:02}:00");
        document.insert(reading, JsonString::linked("label"), JsonString::copied(&label).into())?;
    }

    println!("Before shrinking:");
    println!("  Capacity: {} bytes", document.capacity());
    println!("  Memory usage: {} bytes", document.memory_usage());

    let reclaimed = document.shrink_to_fit()?;

    println!();
    println!("After shrinking:");
    println!("  Reclaimed: {reclaimed} bytes");
    println!("  Capacity: {} bytes", document.capacity());
    println!("  Memory usage: {} bytes", document.memory_usage());

    // The content survives the move of the pool buffer.
    let readings = document
        .member(Node::Root, "readings")
        .expect("the member was inserted above");
    let last = document
        .element(readings, 23)
        .expect("24 readings were added above");
    let label = document
        .member(last, "label")
        .and_then(|label| document.as_str(label))
        .expect("every reading has a label");

    println!();
    println!("Last label: {label}");

    Ok(())
}
