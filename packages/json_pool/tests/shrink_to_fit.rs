//! Shrink-to-fit tests running against an allocator that always moves blocks on reallocation.
//!
//! Every scenario builds a document in a generously sized pool, shrinks it twice and checks
//! that the pool ends up at the minimal aligned size while the content reads back intact.
//! Because the old block is poisoned when it moves, any handle that was not rebased reads
//! garbage and fails the comparison.

use json_pool::{
    ALIGNMENT, Error, JsonDocument, JsonString, Node, SLOT_SIZE, Value, align_up, size_of_array,
    size_of_object, size_of_string,
};
use testing::{FlakyAllocator, RelocatingAllocator};

const GENEROUS_CAPACITY: usize = 4096;

/// Shrinks the document twice, checking the capacity, usage and serialized content each time.
///
/// The usage must not change. The string region may end off the alignment boundary, so the
/// usage can be up to `ALIGNMENT - 1` bytes less than the shrunk capacity.
fn check_shrink(
    build: impl FnOnce(&mut JsonDocument<'_, RelocatingAllocator>),
    expected_size: usize,
    expected_json: &str,
) {
    let allocator = RelocatingAllocator::new();

    {
        let mut document = JsonDocument::with_allocator(GENEROUS_CAPACITY, &allocator);
        build(&mut document);

        assert!(!document.overflowed());
        assert_eq!(document.to_string(), expected_json);

        let usage = document.memory_usage();

        for _ in 0..2 {
            document.shrink_to_fit().unwrap();

            assert_eq!(document.capacity(), expected_size);
            assert_eq!(document.memory_usage(), usage);
            assert_eq!(align_up(usage), Some(expected_size));
            assert!(!document.overflowed());
            assert_eq!(document.to_string(), expected_json);
        }
    }

    assert_eq!(allocator.live_blocks(), 0);
}

#[test]
fn null() {
    check_shrink(|_| {}, 0, "null");
}

#[test]
fn empty_object() {
    check_shrink(
        |document| document.set(Node::Root, Value::Object).unwrap(),
        0,
        "{}",
    );
}

#[test]
fn empty_array() {
    check_shrink(
        |document| document.set(Node::Root, Value::Array).unwrap(),
        0,
        "[]",
    );
}

#[test]
fn linked_string() {
    check_shrink(
        |document| {
            document
                .set(Node::Root, JsonString::linked("hello").into())
                .unwrap();
        },
        0,
        r#""hello""#,
    );
}

#[test]
fn owned_string() {
    let text = String::from("abcdefg");

    check_shrink(
        |document| {
            document
                .set(Node::Root, JsonString::copied(&text).into())
                .unwrap();
        },
        ALIGNMENT,
        r#""abcdefg""#,
    );
}

#[test]
fn linked_raw() {
    check_shrink(
        |document| {
            document
                .set(Node::Root, Value::Raw(JsonString::linked("[{}]")))
                .unwrap();
        },
        0,
        "[{}]",
    );
}

#[test]
fn owned_raw() {
    let raw = String::from("[{},12]");

    check_shrink(
        |document| {
            document
                .set(Node::Root, Value::Raw(JsonString::copied(&raw)))
                .unwrap();
        },
        align_up(size_of_string(raw.len())).unwrap(),
        "[{},12]",
    );
}

#[test]
fn linked_key() {
    check_shrink(
        |document| {
            _ = document
                .insert(Node::Root, JsonString::linked("key"), 42.into())
                .unwrap();
        },
        size_of_object(1),
        r#"{"key":42}"#,
    );
}

#[test]
fn owned_key() {
    let key = String::from("abcdefg");

    check_shrink(
        |document| {
            _ = document
                .insert(Node::Root, JsonString::copied(&key), 42.into())
                .unwrap();
        },
        ALIGNMENT + size_of_object(1),
        r#"{"abcdefg":42}"#,
    );
}

#[test]
fn linked_string_in_array() {
    check_shrink(
        |document| {
            _ = document
                .add(Node::Root, JsonString::linked("hello").into())
                .unwrap();
        },
        size_of_array(1),
        r#"["hello"]"#,
    );
}

#[test]
fn owned_string_in_array() {
    let text = String::from("abcdefg");

    check_shrink(
        |document| {
            _ = document
                .add(Node::Root, JsonString::copied(&text).into())
                .unwrap();
        },
        ALIGNMENT + size_of_array(1),
        r#"["abcdefg"]"#,
    );
}

#[test]
fn linked_string_in_object() {
    check_shrink(
        |document| {
            _ = document
                .insert(
                    Node::Root,
                    JsonString::linked("key"),
                    JsonString::linked("hello").into(),
                )
                .unwrap();
        },
        size_of_object(1),
        r#"{"key":"hello"}"#,
    );
}

#[test]
fn owned_string_in_object() {
    let text = String::from("abcdefg");

    check_shrink(
        |document| {
            _ = document
                .insert(
                    Node::Root,
                    JsonString::linked("key"),
                    JsonString::copied(&text).into(),
                )
                .unwrap();
        },
        ALIGNMENT + size_of_object(1),
        r#"{"key":"abcdefg"}"#,
    );
}

#[test]
fn unaligned_string_region() {
    // One byte of string content makes the string region end off the alignment boundary, so
    // the slot region has to land on the next boundary after it.
    let allocator = RelocatingAllocator::new();

    {
        let mut document = JsonDocument::with_allocator(GENEROUS_CAPACITY, &allocator);
        _ = document
            .add(Node::Root, JsonString::copied("?").into())
            .unwrap();

        // One slot plus the character and its terminator.
        assert_eq!(document.memory_usage(), size_of_array(1) + 2);

        for _ in 0..2 {
            document.shrink_to_fit().unwrap();

            assert_eq!(document.memory_usage(), size_of_array(1) + 2);
            assert_eq!(document.capacity(), size_of_array(1) + ALIGNMENT);

            let element = document.element(Node::Root, 0).unwrap();
            assert_eq!(document.as_str(element), Some("?"));
            assert_eq!(document.to_string(), r#"["?"]"#);
        }
    }

    assert_eq!(allocator.live_blocks(), 0);
}

#[test]
fn nested_collections() {
    let names = ["first", "second", "third"];

    check_shrink(
        |document| {
            let list = document
                .insert(Node::Root, JsonString::linked("list"), Value::Array)
                .unwrap();

            for (index, name) in names.iter().enumerate() {
                let entry = document.add(list, Value::Object).unwrap();
                _ = document
                    .insert(entry, JsonString::linked("name"), JsonString::copied(name).into())
                    .unwrap();
                _ = document
                    .insert(
                        entry,
                        JsonString::copied("index"),
                        i64::try_from(index).unwrap().into(),
                    )
                    .unwrap();
            }
        },
        // Strings: "first", "second", "third" and "index" with terminators.
        align_up(6 + 7 + 6 + 6).unwrap() + size_of_object(1) + size_of_array(3) + 6 * SLOT_SIZE,
        concat!(
            r#"{"list":["#,
            r#"{"name":"first","index":0},"#,
            r#"{"name":"second","index":1},"#,
            r#"{"name":"third","index":2}"#,
            "]}"
        ),
    );
}

#[test]
fn nodes_can_be_looked_up_again_after_moving() {
    let allocator = RelocatingAllocator::new();
    let mut document = JsonDocument::with_allocator(GENEROUS_CAPACITY, &allocator);

    let values = document
        .insert(Node::Root, JsonString::copied("values"), Value::Array)
        .unwrap();
    for value in 0..10 {
        _ = document.add(values, Value::Integer(value)).unwrap();
    }

    let reclaimed = document.shrink_to_fit().unwrap();
    assert!(reclaimed > 0);
    assert_eq!(allocator.reallocations(), 1);

    let values = document.member(Node::Root, "values").unwrap();
    let read: Vec<_> = document
        .children(values)
        .filter_map(|child| document.as_i64(child))
        .collect();

    assert_eq!(read, (0..10).collect::<Vec<_>>());
}

#[test]
fn document_keeps_working_after_shrink() {
    let allocator = RelocatingAllocator::new();
    let mut document = JsonDocument::with_allocator(GENEROUS_CAPACITY, &allocator);

    _ = document.add(Node::Root, 1.into()).unwrap();
    document.shrink_to_fit().unwrap();

    // The shrunk pool is full, so adding more overflows instead of corrupting anything.
    let error = document.add(Node::Root, 2.into()).unwrap_err();
    assert!(matches!(error, Error::PoolExhausted { .. }));
    assert!(document.overflowed());
    assert_eq!(document.to_string(), "[1]");

    // Clearing keeps the shrunk buffer.
    document.clear();
    _ = document.add(Node::Root, 3.into()).unwrap();
    assert_eq!(document.to_string(), "[3]");
}

#[test]
fn failed_reallocation_leaves_document_intact() {
    let allocator = FlakyAllocator::new();
    let mut document = JsonDocument::with_allocator(GENEROUS_CAPACITY, &allocator);

    let list = document
        .insert(Node::Root, JsonString::copied("list"), Value::Array)
        .unwrap();
    _ = document.add(list, "item".into()).unwrap();
    let usage = document.memory_usage();

    allocator.fail_reallocate(true);

    let error = document.shrink_to_fit().unwrap_err();
    assert!(matches!(error, Error::ReallocationFailed { .. }));

    assert_eq!(document.capacity(), GENEROUS_CAPACITY);
    assert_eq!(document.memory_usage(), usage);
    assert_eq!(document.to_string(), r#"{"list":["item"]}"#);

    // The node obtained before the failed attempt is still valid.
    _ = document.add(list, "more".into()).unwrap();
    assert_eq!(document.to_string(), r#"{"list":["item","more"]}"#);

    allocator.fail_reallocate(false);
    assert!(document.shrink_to_fit().unwrap() > 0);
    assert_eq!(document.to_string(), r#"{"list":["item","more"]}"#);
}
