//! Example entities, registered so `kiln schema` has something to show.
//!
//! Applications link their own entities the same way.

use kiln::{
    AbstractType, Column, EntityRegistration, EntitySchema, ReferentialAction,
    RelationDefinition, RelationKind,
};

fn user() -> EntitySchema {
    EntitySchema::new("User")
        .source("UserRepository")
        .column(Column::new("email", AbstractType::String(255)))
        .column(Column::new("name", AbstractType::String(255)))
        .column(Column::new("bio", AbstractType::Text).nullable(true))
        .unique(&["email"])
}

fn post() -> EntitySchema {
    EntitySchema::new("Post")
        .source("PostRepository")
        .implements("Commentable")
        .column(Column::new("title", AbstractType::String(255)))
        .column(Column::new("body", AbstractType::Text))
        .column(Column::new("published_at", AbstractType::Timestamp).nullable(true))
        .relation(
            "author",
            RelationDefinition::belongs_to("User")
                .nullable(false)
                .inverse("posts", Some(RelationKind::HasMany)),
        )
        .relation(
            "tags",
            RelationDefinition::many_to_many("Tag").inverse("posts", None),
        )
}

fn video() -> EntitySchema {
    EntitySchema::new("Video")
        .implements("Commentable")
        .column(Column::new("url", AbstractType::Text))
}

fn comment() -> EntitySchema {
    EntitySchema::new("Comment")
        .column(Column::new("body", AbstractType::Text))
        .relation(
            "subject",
            RelationDefinition::belongs_to("Commentable")
                .inverse("comments", Some(RelationKind::HasMany)),
        )
        .relation(
            "author",
            RelationDefinition::belongs_to("User").action(ReferentialAction::SetNull),
        )
}

fn tag() -> EntitySchema {
    EntitySchema::new("Tag")
        .column(Column::new("label", AbstractType::String(64)))
        .unique(&["label"])
}

kiln::inventory::submit!(EntityRegistration::new(user));
kiln::inventory::submit!(EntityRegistration::new(post));
kiln::inventory::submit!(EntityRegistration::new(video));
kiln::inventory::submit!(EntityRegistration::new(comment));
kiln::inventory::submit!(EntityRegistration::new(tag));
