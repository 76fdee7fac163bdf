use super::*;

#[test]
fn release_over_column_resolves() {
    let mut session = DragSession::new();
    session.start(DealId(1)).unwrap();

    let state = session.end(Some(DealStatus::Won)).unwrap();

    assert_eq!(
        state,
        DragState::Resolved {
            deal_id: DealId(1),
            target: DealStatus::Won
        }
    );
    assert_eq!(
        session.take(),
        Some(DragResolution::Resolved {
            deal_id: DealId(1),
            target: DealStatus::Won
        })
    );
    assert!(session.is_idle());
}

#[test]
fn release_over_nothing_cancels() {
    let mut session = DragSession::new();
    session.start(DealId(4)).unwrap();

    assert_eq!(
        session.end(None).unwrap(),
        DragState::Cancelled { deal_id: DealId(4) }
    );
    assert_eq!(
        session.take(),
        Some(DragResolution::Cancelled { deal_id: DealId(4) })
    );
}

#[test]
fn escape_cancels_active_drag() {
    let mut session = DragSession::new();
    session.start(DealId(2)).unwrap();

    assert_eq!(
        session.cancel().unwrap(),
        DragState::Cancelled { deal_id: DealId(2) }
    );
}

#[test]
fn second_start_is_refused_until_taken() {
    let mut session = DragSession::new();
    session.start(DealId(1)).unwrap();

    assert_eq!(
        session.start(DealId(2)),
        Err(PipelineError::DragInProgress(DealId(1)))
    );

    session.end(Some(DealStatus::Lost)).unwrap();
    assert_eq!(
        session.start(DealId(2)),
        Err(PipelineError::DragInProgress(DealId(1)))
    );

    session.take();
    session.start(DealId(2)).unwrap();
}

#[test]
fn ending_without_a_drag_fails() {
    let mut session = DragSession::new();

    assert_eq!(
        session.end(Some(DealStatus::Won)),
        Err(PipelineError::NoActiveDrag)
    );
    assert_eq!(session.take(), None);
}

#[test]
fn take_while_dragging_yields_nothing() {
    let mut session = DragSession::new();
    session.start(DealId(3)).unwrap();

    assert_eq!(session.take(), None);
    assert_eq!(session.state(), DragState::Dragging { deal_id: DealId(3) });
}

#[test]
fn parses_drop_target_ids() {
    assert_eq!(
        DropTarget::parse("won"),
        Some(DropTarget::Column(DealStatus::Won))
    );
    assert_eq!(
        DropTarget::parse(" in_progress "),
        Some(DropTarget::Column(DealStatus::InProgress))
    );
    assert_eq!(DropTarget::parse("12"), Some(DropTarget::Card(DealId(12))));
    assert_eq!(
        DropTarget::parse("deal-7"),
        Some(DropTarget::Card(DealId(7)))
    );
    assert_eq!(DropTarget::parse("sidebar"), None);
    assert_eq!(DropTarget::parse(""), None);
}
