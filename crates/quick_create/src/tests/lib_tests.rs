use std::collections::{HashMap, HashSet};

use serde_json::json;
use tokio::sync::Mutex;

use super::*;

#[derive(Default)]
struct MemoryStore {
    slots: Mutex<HashMap<SessionId, String>>,
}

impl MemoryStore {
    async fn raw(&self, session: &SessionId) -> Option<String> {
        self.slots.lock().await.get(session).cloned()
    }
}

#[async_trait]
impl StackStore for MemoryStore {
    async fn load(&self, session: &SessionId) -> Result<WorkflowState> {
        match self.slots.lock().await.get(session) {
            Some(raw) => Ok(serde_json::from_str(raw)?),
            None => Ok(WorkflowState::new()),
        }
    }

    async fn save(&self, session: &SessionId, state: &WorkflowState) -> Result<()> {
        let mut slots = self.slots.lock().await;
        if state.is_active() {
            slots.insert(session.clone(), serde_json::to_string(state)?);
        } else {
            slots.remove(session);
        }
        Ok(())
    }
}

struct MemoryAccessor {
    entity_type: EntityType,
    ids: HashSet<i64>,
}

#[async_trait]
impl RecordAccessor for MemoryAccessor {
    async fn retrieve_by_primary_key(&self, id: RecordId) -> Result<Option<RecordRef>> {
        Ok(self
            .ids
            .contains(&id.0)
            .then(|| RecordRef::new(self.entity_type.clone(), id)))
    }
}

fn setup(records: &[(&str, i64)]) -> (QuickCreateContext, Arc<MemoryStore>, SessionId) {
    let mut ids_by_type: HashMap<&str, HashSet<i64>> = HashMap::new();
    for (entity_type, id) in records {
        ids_by_type.entry(*entity_type).or_default().insert(*id);
    }

    let store = Arc::new(MemoryStore::default());
    let mut accessors = AccessorRegistry::new();
    for (entity_type, ids) in ids_by_type {
        accessors.register(
            entity_type,
            Arc::new(MemoryAccessor {
                entity_type: EntityType::new(entity_type),
                ids,
            }),
        );
    }
    let ctx = QuickCreateContext {
        store: store.clone(),
        accessors,
        navigator: Arc::new(RouteNavigator::new("http://admin.test/").expect("navigator")),
    };
    (ctx, store, SessionId::new("session-1"))
}

fn edit_request(module: &str, extra: &[(&str, &str)]) -> FormRequest {
    let mut pairs = vec![("module", module), ("action", "edit")];
    pairs.extend_from_slice(extra);
    FormRequest::from_pairs(Method::Post, pairs)
}

fn resume_request(module: &str) -> FormRequest {
    FormRequest::from_pairs(
        Method::Get,
        [("module", module), ("action", "edit"), ("quick-created", "1")],
    )
}

fn redirect_url(outcome: Outcome) -> String {
    match outcome {
        Outcome::Redirect(redirect) => redirect.url,
        other => panic!("expected redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn event_quick_creates_venue_end_to_end() {
    let (ctx, _store, session) = setup(&[("Venue", 42)]);
    let event = EntityType::new("Event");
    let specs = [FieldSpec::new("Venue"), FieldSpec::new("Dj").with_field("second_dj")];

    let mut request = edit_request(
        "event",
        &[
            ("id", "7"),
            ("event[name]", "Launch"),
            ("event[venue_id]", ""),
            ("quick-create-venue_id", "1"),
        ],
    );
    let snapshot = request.get_all();
    let outcome = prepare_edit(&ctx, &session, &event, &specs, &mut request)
        .await
        .expect("trigger");
    assert_eq!(redirect_url(outcome), "http://admin.test/venue/edit");

    let state = ctx.store.load(&session).await.expect("load");
    assert_eq!(state.depth(), 1);
    let frame = state.peek().expect("frame");
    assert_eq!(frame.admin_type, "Event");
    assert_eq!(frame.related_type, "Venue");
    assert_eq!(frame.field, "venue_id");
    assert_eq!(frame.parameters, snapshot);
    assert_eq!(frame.id, None);
    assert!(active(&ctx, &session).await.expect("active"));

    let redirect = after_save(&ctx, &session, &RecordRef::new("Venue", RecordId(42)))
        .await
        .expect("save")
        .expect("redirect");
    assert_eq!(redirect.url, "http://admin.test/event/edit?quick-created=1");
    let state = ctx.store.load(&session).await.expect("load");
    assert_eq!(state.depth(), 1);
    assert_eq!(state.peek().and_then(|f| f.id), Some(RecordId(42)));

    let mut request = resume_request("event");
    let outcome = prepare_edit(&ctx, &session, &event, &specs, &mut request)
        .await
        .expect("resume");
    assert_eq!(outcome, Outcome::PROCESS_SUBMISSION);
    assert_eq!(request.method(), Method::Post);
    assert!(!request.has("quick-created"));
    assert_eq!(request.get_str("id"), Some("7"));
    assert_eq!(request.get_nested("event", "venue_id"), Some(&json!("42")));
    assert_eq!(request.get_nested("event", "name"), Some(&json!("Launch")));
    assert!(!active(&ctx, &session).await.expect("active"));
}

#[tokio::test]
async fn custom_field_and_module_are_honoured() {
    let (ctx, _store, session) = setup(&[]);
    let specs = [FieldSpec::new("Dj")
        .with_field("second_dj")
        .with_module("djAdmin")];
    let mut request = edit_request("event", &[("quick-create-second_dj", "1")]);

    let outcome = prepare_edit(&ctx, &session, &EntityType::new("Event"), &specs, &mut request)
        .await
        .expect("trigger");
    assert_eq!(redirect_url(outcome), "http://admin.test/djAdmin/edit");
    let state = ctx.store.load(&session).await.expect("load");
    assert_eq!(state.peek().map(|f| f.field.as_str()), Some("second_dj"));
}

#[tokio::test]
async fn first_matching_trigger_wins() {
    let (ctx, _store, session) = setup(&[]);
    let specs = [FieldSpec::new("Venue"), FieldSpec::new("Dj")];
    let mut request = edit_request(
        "event",
        &[("quick-create-dj_id", "1"), ("quick-create-venue_id", "1")],
    );

    let _ = prepare_edit(&ctx, &session, &EntityType::new("Event"), &specs, &mut request)
        .await
        .expect("trigger");
    let state = ctx.store.load(&session).await.expect("load");
    assert_eq!(state.depth(), 1);
    assert_eq!(state.peek().map(|f| f.related_type.as_str()), Some("Venue"));
}

#[tokio::test]
async fn nested_quick_creates_unwind_in_reverse_order() {
    let (ctx, _store, session) = setup(&[("Country", 3), ("City", 2), ("Venue", 1)]);
    let event = EntityType::new("Event");
    let venue = EntityType::new("Venue");
    let city = EntityType::new("City");
    let event_specs = [FieldSpec::new("Venue")];
    let venue_specs = [FieldSpec::new("City")];
    let city_specs = [FieldSpec::new("Country")];

    let mut request = edit_request("event", &[("event[name]", "Launch"), ("quick-create-venue_id", "1")]);
    let _ = prepare_edit(&ctx, &session, &event, &event_specs, &mut request).await.expect("event");
    let mut request = edit_request("venue", &[("venue[name]", "Hall"), ("quick-create-city_id", "1")]);
    let _ = prepare_edit(&ctx, &session, &venue, &venue_specs, &mut request).await.expect("venue");
    let mut request = edit_request("city", &[("city[name]", "Oslo"), ("quick-create-country_id", "1")]);
    let outcome = prepare_edit(&ctx, &session, &city, &city_specs, &mut request).await.expect("city");
    assert_eq!(redirect_url(outcome), "http://admin.test/country/edit");
    assert_eq!(ctx.store.load(&session).await.expect("load").depth(), 3);

    let unwind = [
        ("Country", 3, &city, &city_specs[..], "city", "country_id"),
        ("City", 2, &venue, &venue_specs[..], "venue", "city_id"),
        ("Venue", 1, &event, &event_specs[..], "event", "venue_id"),
    ];
    for (depth_left, (saved_type, id, admin_type, specs, form_key, field)) in
        (0..3).rev().zip(unwind)
    {
        let redirect = after_save(&ctx, &session, &RecordRef::new(saved_type, RecordId(id)))
            .await
            .expect("save")
            .expect("redirect");
        assert_eq!(
            redirect.url,
            format!("http://admin.test/{form_key}/edit?quick-created=1")
        );

        let mut request = resume_request(form_key);
        let outcome = prepare_edit(&ctx, &session, admin_type, specs, &mut request)
            .await
            .expect("resume");
        assert_eq!(outcome, Outcome::PROCESS_SUBMISSION);
        assert_eq!(request.get_nested(form_key, field), Some(&json!(id.to_string())));
        assert_eq!(ctx.store.load(&session).await.expect("load").depth(), depth_left);
    }

    assert!(!active(&ctx, &session).await.expect("active"));
}

#[tokio::test]
async fn index_abandons_every_pending_frame() {
    let (ctx, store, session) = setup(&[]);
    for (module, admin, trigger, related) in [
        ("event", "Event", "quick-create-venue_id", "Venue"),
        ("venue", "Venue", "quick-create-city_id", "City"),
    ] {
        let mut request = edit_request(module, &[(trigger, "1")]);
        let _ = prepare_edit(&ctx, &session, &EntityType::new(admin), &[FieldSpec::new(related)], &mut request)
            .await
            .expect("trigger");
    }
    assert_eq!(ctx.store.load(&session).await.expect("load").depth(), 2);

    after_index(&ctx, &session, &EntityType::new("Dj")).await.expect("index");
    assert!(store.raw(&session).await.is_none());
    assert!(ctx.store.load(&session).await.expect("load").peek().is_none());
}

#[tokio::test]
async fn mismatched_resume_clears_the_whole_stack() {
    let (ctx, _store, session) = setup(&[("Venue", 42)]);
    let mut request = edit_request("event", &[("quick-create-venue_id", "1")]);
    let _ = prepare_edit(&ctx, &session, &EntityType::new("Event"), &[FieldSpec::new("Venue")], &mut request)
        .await
        .expect("trigger");
    let _ = after_save(&ctx, &session, &RecordRef::new("Venue", RecordId(42)))
        .await
        .expect("save");

    let mut request = resume_request("venue");
    let before = request.clone();
    let outcome = prepare_edit(&ctx, &session, &EntityType::new("Venue"), &[], &mut request)
        .await
        .expect("resume");

    assert_eq!(outcome, Outcome::RENDER_FORM);
    assert_eq!(request, before);
    assert!(!active(&ctx, &session).await.expect("active"));
}

#[tokio::test]
async fn resume_with_empty_stack_renders_fresh_form() {
    let (ctx, _store, session) = setup(&[]);
    let mut request = resume_request("event");
    let outcome = prepare_edit(&ctx, &session, &EntityType::new("Event"), &[], &mut request)
        .await
        .expect("resume");
    assert_eq!(outcome, Outcome::RENDER_FORM);
}

#[tokio::test]
async fn resume_without_resolvable_record_skips_injection() {
    let (ctx, _store, session) = setup(&[("Venue", 99)]);
    let event = EntityType::new("Event");
    let specs = [FieldSpec::new("Venue")];
    let mut request = edit_request(
        "event",
        &[("event[venue_id]", "5"), ("quick-create-venue_id", "1")],
    );
    let _ = prepare_edit(&ctx, &session, &event, &specs, &mut request).await.expect("trigger");
    let _ = after_save(&ctx, &session, &RecordRef::new("Venue", RecordId(42)))
        .await
        .expect("save");

    let mut request = resume_request("event");
    let outcome = prepare_edit(&ctx, &session, &event, &specs, &mut request)
        .await
        .expect("resume");
    assert_eq!(outcome, Outcome::PROCESS_SUBMISSION);
    assert_eq!(request.method(), Method::Post);
    assert_eq!(request.get_nested("event", "venue_id"), Some(&json!("5")));
}

#[tokio::test]
async fn resume_before_save_has_no_id_to_inject() {
    let (ctx, _store, session) = setup(&[("Venue", 42)]);
    let event = EntityType::new("Event");
    let specs = [FieldSpec::new("Venue")];
    let mut request = edit_request("event", &[("quick-create-venue_id", "1")]);
    let _ = prepare_edit(&ctx, &session, &event, &specs, &mut request).await.expect("trigger");

    let mut request = resume_request("event");
    let outcome = prepare_edit(&ctx, &session, &event, &specs, &mut request)
        .await
        .expect("resume");
    assert_eq!(outcome, Outcome::PROCESS_SUBMISSION);
    assert_eq!(request.get("event"), None);
}

#[tokio::test]
async fn unrelated_save_leaves_stack_untouched() {
    let (ctx, store, session) = setup(&[]);
    let mut request = edit_request("event", &[("quick-create-venue_id", "1")]);
    let _ = prepare_edit(&ctx, &session, &EntityType::new("Event"), &[FieldSpec::new("Venue")], &mut request)
        .await
        .expect("trigger");
    let before = store.raw(&session).await;

    let redirect = after_save(&ctx, &session, &RecordRef::new("Dj", RecordId(9)))
        .await
        .expect("save");
    assert!(redirect.is_none());
    assert_eq!(store.raw(&session).await, before);

    let redirect = after_save(&ctx, &session, &RecordRef::new("venue", RecordId(9)))
        .await
        .expect("save");
    assert!(redirect.is_none(), "type match is case sensitive");
    assert_eq!(store.raw(&session).await, before);
}

#[tokio::test]
async fn hooks_are_neutral_on_empty_stack() {
    let (ctx, store, session) = setup(&[]);
    let venue = EntityType::new("Venue");

    let mut request = edit_request("venue", &[("venue[name]", "Hall")]);
    let before = request.clone();
    let outcome = prepare_edit(&ctx, &session, &venue, &[FieldSpec::new("City")], &mut request)
        .await
        .expect("prepare");
    assert_eq!(outcome, Outcome::RENDER_FORM);
    assert_eq!(request, before);

    assert!(after_list(&ctx, &session, &venue).await.expect("list").is_none());
    after_index(&ctx, &session, &venue).await.expect("index");
    assert!(after_save(&ctx, &session, &RecordRef::new("Venue", RecordId(1)))
        .await
        .expect("save")
        .is_none());
    assert!(!active(&ctx, &session).await.expect("active"));
    assert!(store.raw(&session).await.is_none());
}

#[tokio::test]
async fn list_of_awaited_type_returns_to_suspended_edit() {
    let (ctx, store, session) = setup(&[]);
    let mut request = edit_request("event", &[("quick-create-venue_id", "1")]);
    let _ = prepare_edit(&ctx, &session, &EntityType::new("Event"), &[FieldSpec::new("Venue")], &mut request)
        .await
        .expect("trigger");
    let before = store.raw(&session).await;

    let redirect = after_list(&ctx, &session, &EntityType::new("Venue"))
        .await
        .expect("list")
        .expect("redirect");
    assert_eq!(redirect.url, "http://admin.test/event/edit?quick-created=1");
    assert_eq!(store.raw(&session).await, before);

    assert!(after_list(&ctx, &session, &EntityType::new("Dj"))
        .await
        .expect("list")
        .is_none());
}

#[tokio::test]
async fn missing_dispatch_target_falls_back_to_admin_module() {
    let (ctx, _store, session) = setup(&[]);
    let mut request = FormRequest::from_pairs(Method::Post, [("quick-create-venue_hall_id", "1")]);
    let _ = prepare_edit(
        &ctx,
        &session,
        &EntityType::new("Event"),
        &[FieldSpec::new("VenueHall")],
        &mut request,
    )
    .await
    .expect("trigger");

    let redirect = after_save(&ctx, &session, &RecordRef::new("VenueHall", RecordId(4)))
        .await
        .expect("save")
        .expect("redirect");
    assert_eq!(redirect.url, "http://admin.test/event/edit?quick-created=1");
}

#[tokio::test]
async fn bad_route_does_not_push_a_frame() {
    let (ctx, store, session) = setup(&[]);
    let mut request = edit_request("event", &[("quick-create-venue_id", "1")]);
    let err = prepare_edit(
        &ctx,
        &session,
        &EntityType::new("Event"),
        &[FieldSpec::new("Venue").with_module("")],
        &mut request,
    )
    .await
    .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Navigation);
    assert!(store.raw(&session).await.is_none());
}

#[tokio::test]
async fn sessions_do_not_share_stacks() {
    let (ctx, _store, session) = setup(&[]);
    let other = SessionId::new("session-2");
    let mut request = edit_request("event", &[("quick-create-venue_id", "1")]);
    let _ = prepare_edit(&ctx, &session, &EntityType::new("Event"), &[FieldSpec::new("Venue")], &mut request)
        .await
        .expect("trigger");

    assert!(active(&ctx, &session).await.expect("active"));
    assert!(!active(&ctx, &other).await.expect("active"));
}

#[tokio::test]
async fn resume_with_unregistered_accessor_treats_record_as_missing() {
    let (ctx, _store, session) = setup(&[]);
    let event = EntityType::new("Event");
    let specs = [FieldSpec::new("Dj")];
    let mut request = edit_request(
        "event",
        &[("event[name]", "Launch"), ("quick-create-dj_id", "1")],
    );
    let _ = prepare_edit(&ctx, &session, &event, &specs, &mut request).await.expect("trigger");

    let redirect = after_save(&ctx, &session, &RecordRef::new("Dj", RecordId(5)))
        .await
        .expect("save")
        .expect("redirect");
    assert_eq!(redirect.url, "http://admin.test/event/edit?quick-created=1");

    let mut request = resume_request("event");
    let outcome = prepare_edit(&ctx, &session, &event, &specs, &mut request)
        .await
        .expect("resume");
    assert_eq!(outcome, Outcome::PROCESS_SUBMISSION);
    assert_eq!(request.method(), Method::Post);
    assert_eq!(request.get("event"), Some(&json!({ "name": "Launch" })));
    assert!(!active(&ctx, &session).await.expect("active"));
}

#[tokio::test]
async fn injected_id_matches_form_encoding() {
    let (ctx, _store, session) = setup(&[("Venue", 42)]);
    let event = EntityType::new("Event");
    let specs = [FieldSpec::new("Venue")];
    let mut request = edit_request("event", &[("quick-create-venue_id", "1")]);
    let _ = prepare_edit(&ctx, &session, &event, &specs, &mut request).await.expect("trigger");
    let _ = after_save(&ctx, &session, &RecordRef::new("Venue", RecordId(42)))
        .await
        .expect("save");

    let mut request = resume_request("event");
    let _ = prepare_edit(&ctx, &session, &event, &specs, &mut request)
        .await
        .expect("resume");
    let selected = FormRequest::from_pairs(Method::Post, [("event[venue_id]", "42")]);
    assert_eq!(
        request.get_nested("event", "venue_id"),
        selected.get_nested("event", "venue_id")
    );
}
