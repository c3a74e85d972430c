//! Property-based tests for command reversibility
//!
//! Random edit sequences must undo back to bit-identical block content, and
//! a fresh command after undo must always discard the redo stack.

use blockdoc_editor::*;
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Edit {
    Insert { at: usize, text: String },
    Delete { from: usize, to: usize },
    Replace { from: usize, to: usize, text: String },
    SetText(String),
    SetType(BlockType),
}

fn block_type_strategy() -> impl Strategy<Value = BlockType> {
    prop_oneof![
        Just(BlockType::Text),
        Just(BlockType::Quote),
        Just(BlockType::ListItem),
        (1u8..=6).prop_map(|level| BlockType::Heading { level }),
        "[a-z]{0,8}".prop_map(|target| BlockType::RegionLink { target }),
    ]
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (any::<usize>(), "[a-zé ü.]{0,6}").prop_map(|(at, text)| Edit::Insert { at, text }),
        (any::<usize>(), any::<usize>()).prop_map(|(from, to)| Edit::Delete { from, to }),
        (any::<usize>(), any::<usize>(), "[A-Zß ]{0,4}")
            .prop_map(|(from, to, text)| Edit::Replace { from, to, text }),
        "[a-z ]{0,12}".prop_map(Edit::SetText),
        block_type_strategy().prop_map(Edit::SetType),
    ]
}

/// Map random offsets onto a valid range of the current text
fn range(from: usize, to: usize, len: usize) -> (usize, usize) {
    let a = from % (len + 1);
    let b = to % (len + 1);
    (a.min(b), a.max(b))
}

fn to_command(edit: &Edit, key: BlockKey, len: usize) -> Box<dyn EditorCommand> {
    match edit {
        Edit::Insert { at, text } => {
            Box::new(InsertTextCommand::new(key, at % (len + 1), text.clone()))
        }
        Edit::Delete { from, to } => {
            let (start, stop) = range(*from, *to, len);
            Box::new(DeleteTextCommand::new(key, start, stop))
        }
        Edit::Replace { from, to, text } => {
            let (start, stop) = range(*from, *to, len);
            Box::new(ReplaceTextCommand::new(key, start, stop, text.clone()))
        }
        Edit::SetText(text) => Box::new(SetTextCommand::new(key, text.clone())),
        Edit::SetType(block_type) => Box::new(SetBlockTypeCommand::new(key, block_type.clone())),
    }
}

fn setup(text: &str) -> (CommandSupervisor, BlockKey) {
    let supervisor = CommandSupervisor::new(
        Arc::new(BlockCollection::new()),
        UndoStackConfig::default(),
    );
    let result = supervisor
        .execute(InsertBlockCommand::append(text, BlockType::Text))
        .unwrap();
    (supervisor, result.touched[0])
}

fn content(supervisor: &CommandSupervisor, key: BlockKey) -> BlockContent {
    HierarchicalGuard::read(supervisor.collection(), key)
        .unwrap()
        .snapshot()
        .content()
}

fn char_len(supervisor: &CommandSupervisor, key: BlockKey) -> usize {
    HierarchicalGuard::read(supervisor.collection(), key)
        .unwrap()
        .snapshot()
        .char_len()
}

proptest! {
    #[test]
    fn prop_each_edit_undoes_exactly(
        initial in "[a-zA-Z ]{0,20}",
        edits in prop::collection::vec(edit_strategy(), 1..25),
    ) {
        let (supervisor, key) = setup(&initial);

        for edit in &edits {
            let before = content(&supervisor, key);
            let command = to_command(edit, key, char_len(&supervisor, key));
            supervisor.execute_boxed(command).unwrap();
            let after = content(&supervisor, key);

            supervisor.undo().unwrap();
            prop_assert_eq!(content(&supervisor, key), before);

            supervisor.redo().unwrap();
            prop_assert_eq!(content(&supervisor, key), after);
        }
    }

    #[test]
    fn prop_full_unwind_restores_initial(
        initial in "[a-z ]{0,20}",
        edits in prop::collection::vec(edit_strategy(), 1..25),
    ) {
        let (supervisor, key) = setup(&initial);
        let start = content(&supervisor, key);

        for edit in &edits {
            let command = to_command(edit, key, char_len(&supervisor, key));
            supervisor.execute_boxed(command).unwrap();
        }
        let end = content(&supervisor, key);

        for _ in &edits {
            supervisor.undo().unwrap();
        }
        prop_assert_eq!(content(&supervisor, key), start);

        for _ in &edits {
            supervisor.redo().unwrap();
        }
        prop_assert_eq!(content(&supervisor, key), end);
    }

    #[test]
    fn prop_fresh_command_discards_redo(
        edits in prop::collection::vec(edit_strategy(), 2..12),
        undo_count in 1usize..6,
        last in edit_strategy(),
    ) {
        let (supervisor, key) = setup("seed text");
        for edit in &edits {
            let command = to_command(edit, key, char_len(&supervisor, key));
            supervisor.execute_boxed(command).unwrap();
        }

        let undone = undo_count.min(edits.len());
        for _ in 0..undone {
            supervisor.undo().unwrap();
        }
        prop_assert!(supervisor.can_redo());

        let command = to_command(&last, key, char_len(&supervisor, key));
        supervisor.execute_boxed(command).unwrap();
        prop_assert!(!supervisor.can_redo());
        prop_assert!(matches!(supervisor.redo(), Err(EditorError::NothingToRedo)));
    }

    #[test]
    fn prop_failed_batch_leaves_block_untouched(
        initial in "[a-z]{1,12}",
        text in "[a-z]{1,4}",
    ) {
        let (supervisor, key) = setup(&initial);
        let before = content(&supervisor, key);
        let len = char_len(&supervisor, key);

        let batch = BatchCommand::new("Insert then fail")
            .add_command(Box::new(InsertTextCommand::new(key, 0, text)))
            .add_command(Box::new(DeleteTextCommand::new(key, 0, len + 100)));
        prop_assert!(supervisor.execute(batch).is_err());
        prop_assert_eq!(content(&supervisor, key), before);
        let next_undo = supervisor.next_undo_description();
        prop_assert_eq!(next_undo.as_deref(), Some("Insert block"));
    }
}
