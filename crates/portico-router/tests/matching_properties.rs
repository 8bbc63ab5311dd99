//! Property tests for route matching.

use portico_core::Method;
use portico_router::{PathPattern, RouteTable};
use proptest::prelude::*;

/// `None` stands for a `{param}` segment.
fn segment() -> impl Strategy<Value = Option<&'static str>> {
    prop_oneof![
        prop::sample::select(vec!["users", "resources", "active", "edit", "admin"]).prop_map(Some),
        Just(None),
    ]
}

fn pattern() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 0..4).prop_map(|segments| {
        let mut out = String::new();
        for (i, seg) in segments.into_iter().enumerate() {
            out.push('/');
            match seg {
                Some(literal) => out.push_str(literal),
                None => out.push_str(&format!("{{p{i}}}")),
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    })
}

fn method() -> impl Strategy<Value = Method> {
    prop::sample::select(Method::ALL.to_vec())
}

fn request_path() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec!["users", "resources", "active", "edit", "admin", "42", "x%20y"]),
        0..4,
    )
    .prop_map(|segments| format!("/{}", segments.join("/")))
}

fn build(routes: &[(Method, String)]) -> RouteTable<usize> {
    let mut table = RouteTable::new();
    for (index, (method, pattern)) in routes.iter().enumerate() {
        // Duplicates are rejected; the table just keeps the earlier route.
        let _ = table.register(*method, pattern, "", Vec::<String>::new(), index);
    }
    table
}

proptest! {
    #[test]
    fn test_matching_is_deterministic(
        routes in prop::collection::vec((method(), pattern()), 1..12),
        method in method(),
        path in request_path(),
    ) {
        let table = build(&routes);

        let first = table.match_route(method, &path).ok().map(|m| (*m.route.handler(), m.params));
        for _ in 0..3 {
            let again = table.match_route(method, &path).ok().map(|m| (*m.route.handler(), m.params));
            prop_assert_eq!(&first, &again);
        }
    }

    #[test]
    fn test_first_registered_match_wins(
        routes in prop::collection::vec((method(), pattern()), 1..12),
        method in method(),
        path in request_path(),
    ) {
        let table = build(&routes);

        let expected = table
            .iter()
            .find(|route| {
                route.methods().allows(method)
                    && PathPattern::parse(route.pattern().as_str())
                        .ok()
                        .and_then(|p| p.match_path(&path))
                        .is_some()
            })
            .map(|route| *route.handler());
        let actual = table.match_route(method, &path).ok().map(|m| *m.route.handler());
        prop_assert_eq!(expected, actual);
    }
}
