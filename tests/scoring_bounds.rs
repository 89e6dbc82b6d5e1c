// tests/scoring_bounds.rs
use coffee_scout::ingest::types::EngagementSignals;
use coffee_scout::scoring::{engagement, KeywordScorer};

fn scorer() -> KeywordScorer {
    KeywordScorer::new(
        &["minnesota".into(), "minneapolis".into(), "st. paul".into()],
        &["coffee".into(), "espresso".into(), "cafe".into()],
    )
    .unwrap()
}

#[test]
fn relevance_stays_in_unit_interval() {
    let s = scorer();
    let long = "x".repeat(50_000);
    let spam = "Minneapolis coffee ".repeat(500);
    let cases = [
        ("", ""),
        ("a", "b"),
        ("Minneapolis", "coffee"),
        ("St. Paul espresso", long.as_str()),
        (spam.as_str(), spam.as_str()),
        ("ünïcödé ☕", "Миннеаполис кофе"),
    ];
    for (t, b) in cases {
        let r = s.relevance(t, b);
        assert!((0.0..=1.0).contains(&r), "relevance({t:.20}, ..) = {r}");
    }
}

#[test]
fn keyword_regex_metacharacters_are_literal() {
    let s = scorer();
    // "st. paul" must not match "stX paul".
    assert_eq!(s.mentions("stX paul", "").minnesota, 0);
    assert_eq!(s.mentions("St. Paul", "").minnesota, 1);
}

#[test]
fn engagement_stays_in_unit_interval() {
    let inputs = [
        (0.0, 0.0, 1.0),
        (-50.0, -3.0, 1.0),
        (f64::NAN, f64::INFINITY, 0.5),
        (1e12, 1e12, 1.0),
        (50.0, 10.0, 2.0),
        (50.0, 10.0, -1.0),
        (99.0, 49.0, f64::NAN),
    ];
    for (score, comments, ratio) in inputs {
        let e = engagement(EngagementSignals {
            score,
            comments,
            ratio,
        });
        assert!((0.0..=1.0).contains(&e), "engagement({score}, {comments}, {ratio}) = {e}");
    }
}
