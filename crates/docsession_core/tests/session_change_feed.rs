mod support;

use docsession_core::{
    ChangeToken, DocumentSession, InMemoryRepository, OperationKind, SessionError,
};
use support::Shipment;

#[test]
fn empty_store_returns_nothing_and_echoes_the_beginning_token() {
    let repo = InMemoryRepository::new();
    let mut session = DocumentSession::new(&repo);

    let feed = session
        .advanced()
        .read_changed::<Shipment>(&ChangeToken::beginning())
        .unwrap();

    assert!(feed.changed.is_empty());
    assert_eq!(feed.continuation, ChangeToken::beginning());
}

#[test]
fn one_commit_is_seen_once_and_advances_the_token() {
    let repo = InMemoryRepository::new();
    let mut session = DocumentSession::new(&repo);

    let added = session.add(Shipment::new("ord-1", "acme")).unwrap();
    session.commit_changes().unwrap();

    let first_pass = session
        .advanced()
        .read_changed::<Shipment>(&ChangeToken::beginning())
        .unwrap();
    assert_eq!(first_pass.changed.len(), 1);
    assert_eq!(first_pass.changed[0].meta.id, added.meta.id);

    let watermark: i64 = first_pass.continuation.as_str().parse().unwrap();
    assert!(watermark > 0);

    // Nothing new since that token: empty set, same token back.
    let second_pass = session
        .advanced()
        .read_changed::<Shipment>(&first_pass.continuation)
        .unwrap();
    assert!(second_pass.changed.is_empty());
    assert_eq!(second_pass.continuation, first_pass.continuation);
}

#[test]
fn a_later_commit_is_the_only_change_past_the_previous_token() {
    let repo = InMemoryRepository::new();
    let mut session = DocumentSession::new(&repo);

    session.add(Shipment::new("ord-2", "acme")).unwrap();
    session.commit_changes().unwrap();
    let checkpoint = session
        .advanced()
        .read_changed::<Shipment>(&ChangeToken::beginning())
        .unwrap()
        .continuation;

    let second = session.add(Shipment::new("ord-3", "acme")).unwrap();
    session.commit_changes().unwrap();

    let feed = session
        .advanced()
        .read_changed::<Shipment>(&checkpoint)
        .unwrap();
    assert_eq!(feed.changed.len(), 1);
    assert_eq!(feed.changed[0].meta.id, second.meta.id);

    let before: i64 = checkpoint.as_str().parse().unwrap();
    let after: i64 = feed.continuation.as_str().parse().unwrap();
    assert!(after > before);
}

#[test]
fn tombstones_flow_through_the_change_feed() {
    let repo = InMemoryRepository::new();
    let mut session = DocumentSession::new(&repo);

    let added = session.add(Shipment::new("ord-4", "acme")).unwrap();
    session.commit_changes().unwrap();
    let checkpoint = session
        .advanced()
        .read_changed::<Shipment>(&ChangeToken::beginning())
        .unwrap()
        .continuation;

    session
        .delete_soft_by_id::<Shipment>(added.meta.id)
        .unwrap();
    session.commit_changes().unwrap();

    let feed = session
        .advanced()
        .read_changed::<Shipment>(&checkpoint)
        .unwrap();
    assert_eq!(feed.changed.len(), 1);
    assert_eq!(feed.changed[0].meta.id, added.meta.id);
    assert!(!feed.changed[0].meta.active);
}

#[test]
fn a_malformed_token_is_rejected_before_touching_the_store() {
    let repo = InMemoryRepository::new();
    let mut session = DocumentSession::new(&repo);

    let err = session
        .advanced()
        .read_changed::<Shipment>(&ChangeToken::from("not-a-watermark"))
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidArgument(_)));
    assert!(session.operations().is_empty());
}

#[test]
fn change_queries_are_recorded_as_operations() {
    let repo = InMemoryRepository::new();
    let mut session = DocumentSession::new(&repo);

    session
        .advanced()
        .read_changed::<Shipment>(&ChangeToken::beginning())
        .unwrap();
    session
        .advanced()
        .read_changed::<Shipment>(&ChangeToken::beginning())
        .unwrap();

    assert_eq!(
        session
            .operations()
            .iter()
            .filter(|op| op.kind == OperationKind::ReadChanges)
            .count(),
        2
    );
}
