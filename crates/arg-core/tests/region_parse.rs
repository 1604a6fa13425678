use arg_core::{ArgError, Region};

#[test]
fn parses_start_end_pairs() {
    let region: Region = "100-250".parse().unwrap();
    assert_eq!(region, Region { start: 100, end: 250 });
    assert_eq!(region.len(), 150);
    assert!(region.contains(100));
    assert!(!region.contains(250));
    assert_eq!(region.to_string(), "100-250");
}

#[test]
fn rejects_malformed_regions() {
    for text in ["100", "a-b", "300-200", "5-5", ""] {
        let err = text.parse::<Region>().unwrap_err();
        assert!(matches!(err, ArgError::Config(_)), "{text}");
    }
}
