use super::*;

#[test]
fn test_reference_type_decays_serials() {
    assert_eq!(AbstractType::Primary.reference_type(), AbstractType::Integer);
    assert_eq!(
        AbstractType::BigPrimary.reference_type(),
        AbstractType::BigInteger
    );
    assert_eq!(AbstractType::Uuid.reference_type(), AbstractType::Uuid);
    assert_eq!(
        AbstractType::String(64).reference_type(),
        AbstractType::String(64)
    );
}

#[test]
fn test_abstract_type_sql() {
    assert_eq!(AbstractType::Primary.to_string(), "SERIAL");
    assert_eq!(AbstractType::String(255).to_string(), "VARCHAR(255)");
    assert_eq!(
        AbstractType::Decimal {
            precision: 10,
            scale: 2
        }
        .to_string(),
        "NUMERIC(10, 2)"
    );
    assert_eq!(AbstractType::Timestamp.to_string(), "TIMESTAMPTZ");
}

#[test]
fn test_parse_referential_action() {
    assert_eq!(
        "cascade".parse::<ReferentialAction>(),
        Ok(ReferentialAction::Cascade)
    );
    assert_eq!(
        "CASCADE".parse::<ReferentialAction>(),
        Ok(ReferentialAction::Cascade)
    );
    assert_eq!(
        "set-null".parse::<ReferentialAction>(),
        Ok(ReferentialAction::SetNull)
    );
    assert_eq!(
        "SET NULL".parse::<ReferentialAction>(),
        Ok(ReferentialAction::SetNull)
    );
    assert_eq!(
        "no_action".parse::<ReferentialAction>(),
        Ok(ReferentialAction::NoAction)
    );
    assert_eq!(
        "Restrict".parse::<ReferentialAction>(),
        Ok(ReferentialAction::Restrict)
    );
}

#[test]
fn test_parse_referential_action_invalid() {
    let err = "explode".parse::<ReferentialAction>().unwrap_err();
    assert_eq!(err, ParseActionError("explode".to_string()));
    assert!(err.to_string().contains("explode"));
}

#[test]
fn test_default_action_is_cascade() {
    assert_eq!(ReferentialAction::default(), ReferentialAction::Cascade);
}

#[test]
fn test_conventional_names() {
    assert_eq!(index_name("post", &["user_id"]), "idx_post_user_id");
    assert_eq!(
        unique_index_name("post_tag", &["post_id", "tag_id"]),
        "uq_post_tag_post_id_tag_id"
    );
    assert_eq!(foreign_key_name("comment", &["post_id"]), "fk_comment_post_id");
}

#[test]
fn test_clamp_identifier_short_names_unchanged() {
    assert_eq!(clamp_identifier("idx_user_email"), "idx_user_email");
}

#[test]
fn test_clamp_identifier_long_names() {
    let long = format!("idx_{}_{}", "a".repeat(40), "b".repeat(40));
    let clamped = clamp_identifier(&long);
    assert_eq!(clamped.len(), PG_IDENT_MAX);
    assert!(clamped.starts_with("idx_aaaa"));

    let other = format!("idx_{}_{}", "a".repeat(40), "c".repeat(40));
    assert_ne!(clamp_identifier(&other), clamped);

    // Stable across calls
    assert_eq!(clamp_identifier(&long), clamped);
}

#[test]
fn test_column_same_shape_ignores_name() {
    let a = Column::new("user_id", AbstractType::Integer).nullable(true);
    let b = Column::new("author_id", AbstractType::Integer).nullable(true);
    assert!(a.same_shape(&b));

    let c = Column::new("user_id", AbstractType::BigInteger).nullable(true);
    assert!(!a.same_shape(&c));
}

#[test]
fn test_foreign_key_same_shape_ignores_name() {
    let a = ForeignKey::new("post", "user_id", "user", "id", ReferentialAction::Cascade);
    let mut b = a.clone();
    b.name = "post_user_id_fkey".to_string();
    assert!(a.same_shape(&b));

    b.on_delete = ReferentialAction::Restrict;
    assert!(!a.same_shape(&b));
}

#[test]
fn test_referenced_tables_skip_self() {
    let mut table = Table::new("category");
    table.foreign_keys.push(ForeignKey::new(
        "category",
        "parent_id",
        "category",
        "id",
        ReferentialAction::Cascade,
    ));
    table.foreign_keys.push(ForeignKey::new(
        "category",
        "shop_id",
        "shop",
        "id",
        ReferentialAction::Cascade,
    ));

    let referenced: Vec<&str> = table.referenced_tables().collect();
    assert_eq!(referenced, vec!["shop"]);
}

#[test]
fn test_schema_from_iter_keeps_order() {
    let schema: Schema = ["user", "post", "comment"].into_iter().map(Table::new).collect();
    let names: Vec<&str> = schema.iter_tables().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["user", "post", "comment"]);
}
