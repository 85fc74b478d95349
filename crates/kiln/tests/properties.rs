use kiln::{AbstractType, Column, ForeignKey, Index, ReferentialAction, Table, TableComparator};
use proptest::prelude::*;

fn abstract_type() -> impl Strategy<Value = AbstractType> {
    prop_oneof![
        Just(AbstractType::Boolean),
        Just(AbstractType::Integer),
        Just(AbstractType::BigInteger),
        Just(AbstractType::Text),
        Just(AbstractType::Timestamp),
        (1u16..512).prop_map(AbstractType::String),
    ]
}

fn column() -> impl Strategy<Value = Column> {
    ("[a-z]{1,8}", abstract_type(), any::<bool>())
        .prop_map(|(name, ty, nullable)| Column::new(format!("c_{name}"), ty).nullable(nullable))
}

fn table() -> impl Strategy<Value = Table> {
    prop::collection::vec(column(), 1..8).prop_map(|columns| {
        let mut table = Table::new("t");
        table.columns.push(Column::primary("id", AbstractType::Primary));
        for column in columns {
            if table.column(&column.name).is_none() {
                table.columns.push(column);
            }
        }
        for column in table.columns.clone().iter().skip(1) {
            table.indices.push(Index::new("t", &[&column.name]));
            if column.abstract_type == AbstractType::Integer {
                table.foreign_keys.push(ForeignKey::new(
                    "t",
                    column.name.clone(),
                    "other",
                    "id",
                    ReferentialAction::Cascade,
                ));
            }
        }
        table
    })
}

proptest! {
    #[test]
    fn comparing_a_table_with_itself_finds_nothing(table in table()) {
        let comparator = TableComparator::compare(&table, Some(&table));
        prop_assert!(!comparator.has_changes());
        prop_assert!(comparator.changes().is_empty());
    }

    #[test]
    fn column_and_index_order_does_not_matter(table in table(), seed in any::<u64>()) {
        let mut shuffled = table.clone();
        let len = shuffled.columns.len();
        shuffled.columns.rotate_left((seed as usize) % len);
        shuffled.indices.reverse();
        shuffled.foreign_keys.reverse();

        let comparator = TableComparator::compare(&table, Some(&shuffled));
        prop_assert!(!comparator.has_changes());
    }

    #[test]
    fn a_missing_table_is_created_whole(table in table()) {
        let comparator = TableComparator::compare(&table, None);
        prop_assert!(comparator.is_new());

        let changes = comparator.changes();
        prop_assert_eq!(changes.len(), 1 + table.indices.len() + table.foreign_keys.len());
        prop_assert!(matches!(changes[0], kiln::Change::AddTable(_)));
    }

    #[test]
    fn dropped_columns_are_reported(table in table()) {
        let mut live = table.clone();
        live.columns.push(Column::new("legacy", AbstractType::Text));

        let comparator = TableComparator::compare(&table, Some(&live));
        prop_assert_eq!(comparator.removed_columns().len(), 1);
        prop_assert_eq!(comparator.removed_columns()[0].name.as_str(), "legacy");
    }
}
