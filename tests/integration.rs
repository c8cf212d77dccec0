//! End-to-end scenarios (S1-S6) and cross-stage invariants exercised through
//! the single public entry point, [`pgraf_cypher::translate`].

use pgraf_cypher::config::TranslateOptions;
use pgraf_cypher::{translate, TranslateError};

fn opts() -> TranslateOptions {
    TranslateOptions::default()
}

/// S1: `MATCH (n:User) RETURN n.name LIMIT 5`
#[test]
fn s1_simple_match_return_limit() {
    let translation = translate("MATCH (n:User) RETURN n.name LIMIT 5", &opts()).expect("should translate");
    assert!(translation.sql.contains("FROM pgraf.nodes AS n_0"));
    assert!(translation.sql.contains("'User' = ANY(n_0.labels)"));
    assert!(translation.sql.contains("n_0.properties ->> 'name'"));
    assert!(translation.sql.contains("LIMIT 5"));
    assert!(translation.params.is_empty());
}

/// S2: two-hop relationship pattern, both endpoints and the edge labeled.
#[test]
fn s2_relationship_pattern() {
    let translation = translate(
        "MATCH (a:User)-[:FOLLOWS]->(b:User) RETURN a.name, b.name",
        &opts(),
    )
    .expect("should translate");
    assert!(translation.sql.contains("'User' = ANY(a_0.labels)"));
    assert!(translation.sql.contains("'User' = ANY(b_0.labels)"));
    assert!(translation.sql.contains("'FOLLOWS'"));
    assert!(translation.sql.contains("a_0.id = "));
    assert!(translation.sql.contains(".source AND"));
    assert!(translation.sql.contains(".target = b_0.id"));
}

/// S3: an aggregate-only projection emits no `GROUP BY`, and a numeric
/// comparison against a property casts through `::numeric`.
#[test]
fn s3_aggregate_without_group_by() {
    let translation = translate("MATCH (u:User) WHERE u.age > 25 RETURN COUNT(u)", &opts())
        .expect("should translate");
    assert!(translation.sql.contains("COUNT(u_0.id)"));
    assert!(!translation.sql.contains("GROUP BY"));
    assert!(translation.sql.contains("(u_0.properties ->> 'age')::numeric"));
}

/// S4: a correlated EXISTS subquery referencing the outer node's binding.
#[test]
fn s4_exists_subquery() {
    let translation = translate(
        "MATCH (u:User) WHERE EXISTS { MATCH (u)-[:POSTED]->(:Post) } RETURN u.name",
        &opts(),
    )
    .expect("should translate");
    assert!(translation.sql.contains("EXISTS ("));
    assert!(translation.sql.contains("'POSTED'"));
    assert!(translation.sql.contains("'Post'"));
}

/// S5: a bounded variable-length relationship compiles to a recursive CTE
/// with a depth column, constrained by the literal bounds.
#[test]
fn s5_variable_length_relationship() {
    let translation = translate(
        "MATCH (a:User)-[:FOLLOWS*1..3]->(b:User) RETURN DISTINCT b.name",
        &opts(),
    )
    .expect("should translate");
    assert!(translation.sql.starts_with("WITH RECURSIVE"));
    assert!(translation.sql.contains("depth"));
    assert!(translation.sql.contains(">= 1"));
    assert!(translation.sql.contains("<= 3"));
    assert!(translation.sql.contains("NOT (e.target = ANY(p.path))"));
    assert!(translation.sql.contains("SELECT DISTINCT"));
}

/// S6: a write clause is structurally recognized but rejected at lowering.
#[test]
fn s6_rejects_create() {
    let err = translate("CREATE (n:User)", &opts()).unwrap_err();
    match err {
        TranslateError::Lower(lower_err) => {
            assert_eq!(lower_err.kind.name(), "UnsupportedConstruct");
        }
        other => panic!("expected a lowering error, got {other:?}"),
    }
}

#[test]
fn unknown_variable_is_rejected_before_emission() {
    let err = translate("MATCH (n:User) RETURN m.name", &opts()).unwrap_err();
    assert!(matches!(err, TranslateError::Lower(_)));
}

#[test]
fn optional_match_uses_left_join() {
    let translation = translate(
        "MATCH (u:User) OPTIONAL MATCH (u)-[:POSTED]->(p:Post) RETURN u.name, p.title",
        &opts(),
    )
    .expect("should translate");
    assert!(translation.sql.contains("LEFT JOIN"));
}

#[test]
fn with_boundary_carries_entity_properties_and_supports_chained_aggregation() {
    let translation = translate(
        "MATCH (u:User)-[:POSTED]->(p:Post) WITH u, COUNT(p) AS post_count RETURN u.name, post_count ORDER BY post_count DESC",
        &opts(),
    )
    .expect("should translate");
    assert!(translation.sql.contains("WITH"));
    assert!(translation.sql.contains("GROUP BY"));
    assert!(translation.sql.contains("ORDER BY"));
    // `u` crosses the WITH as a carried entity, so `u.name` still reads its
    // jsonb properties on the far side of the boundary instead of applying
    // `->>` to a bare id column.
    assert!(translation.sql.contains("u__properties"));
    assert!(translation.sql.contains(") ->> 'name'"));
}

#[test]
fn repeated_parameter_reuses_placeholder() {
    let translation = translate(
        "MATCH (n:User) WHERE n.name = $name OR n.nickname = $name RETURN n",
        &opts(),
    )
    .expect("should translate");
    assert_eq!(translation.params.len(), 1);
    assert!(translation.sql.matches("$1").count() >= 2);
}

#[test]
fn nested_aggregate_is_rejected() {
    let err = translate("MATCH (n:User) RETURN SUM(COUNT(n))", &opts()).unwrap_err();
    assert!(matches!(err, TranslateError::Lower(_)));
}

#[test]
fn translation_is_deterministic() {
    let query = "MATCH (a:User)-[:FOLLOWS]->(b:User) RETURN a.name, b.name";
    let first = translate(query, &opts()).expect("should translate");
    let second = translate(query, &opts()).expect("should translate");
    assert_eq!(first, second);
}
