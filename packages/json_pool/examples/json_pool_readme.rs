//! Example that demonstrates the exact code shown in the `json_pool` README.md.
//!
//! This ensures that the README example compiles and runs correctly.

use json_pool::{JsonDocument, JsonString, Node, Value, size_of_array, size_of_object, size_of_string};

fn main() -> Result<(), json_pool::Error> {
    println!("=== JsonPool README Example ===");

    // Size the pool for exactly what the document will hold.
    let capacity = size_of_object(2) + size_of_array(2) + size_of_string(3);
    let mut document = JsonDocument::new(capacity);

    // Keys known at compile time can be linked instead of copied.
    document.insert(Node::Root, JsonString::linked("sensor"), "gps".into())?;
    let data = document.insert(Node::Root, JsonString::linked("data"), Value::Array)?;
    document.add(data, 48.756_080.into())?;
    document.add(data, 2.302_038.into())?;

    println!("Document: {document}");
    println!(
        "Memory usage: {} of {} bytes",
        document.memory_usage(),
        document.capacity()
    );
    assert!(!document.overflowed());

    println!("README example completed successfully!");

    Ok(())
}
