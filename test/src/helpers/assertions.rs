/// Assert that `$events` carries exactly one summary of the given kind and
/// return it
#[macro_export]
macro_rules! expect_summary {
    ($events:expr, $event:ty) => {{
        let summaries: Vec<_> = $events.read::<$event>().collect();
        assert_eq!(
            summaries.len(),
            1,
            "expected exactly one {} in {:?}",
            stringify!($event),
            summaries
        );
        summaries.into_iter().next().unwrap()
    }};
}

/// Assert that a scene request was rejected with the given error variant
#[macro_export]
macro_rules! assert_rejected {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            other => panic!(
                "expected {} rejection, got {:?}",
                stringify!($pattern),
                other
            ),
        }
    };
}
