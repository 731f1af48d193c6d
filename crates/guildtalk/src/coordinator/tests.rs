use super::*;
use crate::{
    engine::mock::{GENERATED, MockEngine},
    reply::Reply,
    session::SessionStatus,
};
use std::sync::atomic::Ordering as StdOrdering;
use tokio::sync::mpsc;

const GUILD: GuildId = 42;

fn coordinator() -> Coordinator<MockEngine> {
    Coordinator::new(
        MockEngine::with_models(&["117M", "345M"]),
        CoordinatorOptions::default(),
    )
    .unwrap()
}

fn config(nsamples: u32, length: u32, model: &str) -> GenerationConfig {
    GenerationConfig {
        nsamples,
        length,
        temperature: 1.0,
        top_k: 0,
        model_name: model.to_string(),
    }
}

async fn collect(sink: ReplySink, mut rx: mpsc::Receiver<Reply>) -> Vec<Reply> {
    drop(sink);
    let mut replies = Vec::new();
    while let Some(reply) = rx.recv().await {
        replies.push(reply);
    }
    replies
}

fn texts(replies: &[Reply]) -> Vec<&str> {
    replies
        .iter()
        .filter_map(|r| match r {
            Reply::Text(text) => Some(text.as_str()),
            Reply::Typing => None,
        })
        .collect()
}

async fn ready_guild(coordinator: &Coordinator<MockEngine>, config: GenerationConfig) {
    coordinator.initialize_all([GUILD]).await.unwrap();
    let (sink, _rx) = ReplySink::channel(64);
    coordinator
        .reconfigure(GUILD, config, Some(1000), Verbosity::Quiet, &sink)
        .await
        .unwrap();
}

async fn talk(
    coordinator: &Coordinator<MockEngine>,
    prompt: Option<&str>,
    verbosity: Verbosity,
) -> (Result<()>, Vec<Reply>) {
    let (sink, rx) = ReplySink::channel(64);
    let result = coordinator
        .handle_request(GUILD, prompt, verbosity, &sink)
        .await;
    (result, collect(sink, rx).await)
}

#[tokio::test]
async fn set_config_then_talk_returns_one_prompted_sample() {
    let coordinator = coordinator();
    coordinator.initialize_all([GUILD]).await.unwrap();

    let (sink, rx) = ReplySink::channel(64);
    coordinator
        .reconfigure(GUILD, config(1, 50, "117M"), Some(1000), Verbosity::Quiet, &sink)
        .await
        .unwrap();
    let replies = collect(sink, rx).await;
    assert_eq!(replies[0], Reply::Typing);
    assert_eq!(
        texts(&replies),
        [
            messages::SETTING_CONFIGURATION.to_string(),
            messages::settings_block("Using settings", &config(1, 50, "117M")),
            messages::CONFIGURATION_SET.to_string(),
        ]
    );
    assert_eq!(
        coordinator.registry().get(GUILD).unwrap().read().status(),
        SessionStatus::Ready
    );

    let (result, replies) = talk(&coordinator, Some("hello"), Verbosity::Quiet).await;
    result.unwrap();
    let texts = texts(&replies);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("hello"));
    assert_eq!(texts[0], format!("hello{GENERATED}"));
    assert!(!coordinator.is_busy());
}

#[tokio::test]
async fn baseline_reconfiguration_reports_only_the_outcome() {
    let coordinator = coordinator();
    coordinator.initialize_all([GUILD]).await.unwrap();

    // 1 * 200 is above the warning threshold but draws no warning here.
    let (sink, rx) = ReplySink::channel(64);
    coordinator
        .reconfigure(GUILD, config(1, 200, "117M"), None, Verbosity::Baseline, &sink)
        .await
        .unwrap();
    let replies = collect(sink, rx).await;
    assert_eq!(replies[0], Reply::Typing);
    assert_eq!(texts(&replies), [messages::DEFAULT_SET]);
    assert!(coordinator.registry().get(GUILD).unwrap().read().is_ready());
}

#[tokio::test]
async fn too_expensive_configuration_changes_nothing() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(1, 50, "117M")).await;

    let (sink, rx) = ReplySink::channel(64);
    let err = coordinator
        .reconfigure(GUILD, config(10, 200, "117M"), Some(1000), Verbosity::Quiet, &sink)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ConfigurationTooExpensive {
            cost: 2000,
            ceiling: 1000
        }
    ));
    assert!(collect(sink, rx).await.is_empty());

    let session = coordinator.registry().get(GUILD).unwrap();
    assert!(session.read().is_ready());
    assert_eq!(session.read().config(), &config(1, 50, "117M"));
    let engine = coordinator.engine();
    assert_eq!(MockEngine::count(&engine.builds), 1);
    assert_eq!(MockEngine::count(&engine.disposals), 0);
}

#[tokio::test]
async fn unknown_model_is_rejected_before_the_busy_region() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(1, 50, "117M")).await;

    let (sink, _rx) = ReplySink::channel(64);
    let err = coordinator
        .reconfigure(GUILD, config(1, 50, "774M"), Some(1000), Verbosity::Quiet, &sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownModel(model) if model == "774M"));
    assert!(coordinator.registry().get(GUILD).unwrap().read().is_ready());
}

#[tokio::test]
async fn requests_before_init_are_refused() {
    let coordinator = coordinator();
    let (sink, _rx) = ReplySink::channel(64);

    assert!(matches!(
        coordinator
            .handle_request(GUILD, Some("hello"), Verbosity::Quiet, &sink)
            .await,
        Err(Error::SystemNotReady)
    ));
    assert!(matches!(
        coordinator
            .reconfigure(GUILD, config(1, 50, "117M"), None, Verbosity::Quiet, &sink)
            .await,
        Err(Error::SystemNotReady)
    ));
    assert!(matches!(
        coordinator.config(GUILD).await,
        Err(Error::SystemNotReady)
    ));
    assert_eq!(MockEngine::count(&coordinator.engine().generations), 0);
    assert!(!coordinator.is_busy());
}

#[tokio::test]
async fn talk_while_busy_fails_without_engine_call() {
    let coordinator = Arc::new(coordinator());
    ready_guild(&coordinator, config(1, 50, "117M")).await;
    let gate = coordinator.engine().hold();

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let (sink, rx) = ReplySink::channel(64);
            let result = coordinator
                .handle_request(GUILD, Some("first"), Verbosity::Quiet, &sink)
                .await;
            (result, collect(sink, rx).await)
        })
    };

    while MockEngine::count(&coordinator.engine().generations) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(coordinator.is_busy());

    let (second, replies) = talk(&coordinator, Some("second"), Verbosity::Quiet).await;
    assert!(matches!(second, Err(Error::Busy)));
    assert!(replies.is_empty());

    let (sink, _rx) = ReplySink::channel(64);
    assert!(matches!(
        coordinator
            .reconfigure(GUILD, config(1, 10, "345M"), None, Verbosity::Quiet, &sink)
            .await,
        Err(Error::Busy)
    ));

    // Reads are not serialized behind the generation.
    assert_eq!(coordinator.config(GUILD).await.unwrap(), config(1, 50, "117M"));
    assert_eq!(MockEngine::count(&coordinator.engine().generations), 1);

    drop(gate);
    let (result, replies) = first.await.unwrap();
    result.unwrap();
    assert_eq!(texts(&replies), [format!("first{GENERATED}")]);
    assert!(!coordinator.is_busy());
}

#[tokio::test]
async fn engine_failure_clears_busy_flag() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(1, 50, "117M")).await;
    coordinator
        .engine()
        .fail_generate
        .store(true, StdOrdering::SeqCst);

    let (result, replies) = talk(&coordinator, Some("hello"), Verbosity::Quiet).await;
    assert!(matches!(result, Err(Error::GenerationFailed(_))));
    assert!(texts(&replies).is_empty());
    assert!(!coordinator.is_busy());

    coordinator
        .engine()
        .fail_generate
        .store(false, StdOrdering::SeqCst);
    let (result, _) = talk(&coordinator, Some("hello"), Verbosity::Quiet).await;
    result.unwrap();
}

#[tokio::test]
async fn engine_panic_is_contained() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(1, 50, "117M")).await;
    coordinator
        .engine()
        .panic_generate
        .store(true, StdOrdering::SeqCst);

    let (result, _) = talk(&coordinator, None, Verbosity::Quiet).await;
    assert!(matches!(
        result,
        Err(Error::GenerationFailed(EngineError::Worker(_)))
    ));
    assert!(!coordinator.is_busy());

    coordinator
        .engine()
        .panic_generate
        .store(false, StdOrdering::SeqCst);
    let (result, replies) = talk(&coordinator, None, Verbosity::Quiet).await;
    result.unwrap();
    assert_eq!(texts(&replies), [GENERATED]);
}

#[tokio::test]
async fn unconfigured_session_is_not_ready() {
    let coordinator = coordinator();
    coordinator.initialize_all([GUILD]).await.unwrap();

    let (result, replies) = talk(&coordinator, Some("hello"), Verbosity::Verbose).await;
    assert!(matches!(
        result,
        Err(Error::SessionNotReady {
            guild_id: GUILD,
            status: SessionStatus::Uninitialized
        })
    ));
    assert!(replies.is_empty());
    assert!(!coordinator.is_busy());
    assert_eq!(MockEngine::count(&coordinator.engine().generations), 0);
}

#[tokio::test]
async fn unknown_guild_is_not_registered() {
    let coordinator = coordinator();
    coordinator.initialize_all([1]).await.unwrap();
    let (result, _) = talk(&coordinator, None, Verbosity::Quiet).await;
    assert!(matches!(result, Err(Error::GuildNotRegistered(GUILD))));
    assert!(!coordinator.is_busy());
}

#[tokio::test]
async fn emits_one_reply_per_sample() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(3, 50, "117M")).await;

    let (result, replies) = talk(&coordinator, Some("hi"), Verbosity::Quiet).await;
    result.unwrap();
    assert_eq!(texts(&replies), vec![format!("hi{GENERATED}"); 3]);
    assert_eq!(replies.iter().filter(|r| **r == Reply::Typing).count(), 3);
    assert_eq!(MockEngine::count(&coordinator.engine().generations), 3);
}

#[tokio::test]
async fn oversized_reply_is_chunked_in_order() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(1, 50, "117M")).await;

    let prompt = "a".repeat(2500);
    let (result, replies) = talk(&coordinator, Some(&prompt), Verbosity::Quiet).await;
    result.unwrap();

    let texts = texts(&replies);
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0].chars().count(), 1990);
    assert_eq!(texts.concat(), format!("{prompt}{GENERATED}"));
}

#[tokio::test]
async fn verbose_talk_reports_guild_and_timing() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(1, 50, "117M")).await;

    let (result, replies) = talk(&coordinator, Some("hello"), Verbosity::Verbose).await;
    result.unwrap();
    let texts = texts(&replies);
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[0], messages::talk_header(GUILD));
    assert_eq!(texts[1], format!("hello{GENERATED}"));
    assert!(texts[2].starts_with("```Response generated in: "));
    assert!(texts[2].ends_with(&format!("Response length: {}```", 5 + GENERATED.len())));
}

#[tokio::test]
async fn verbose_reconfigure_reports_each_phase() {
    let coordinator = coordinator();
    coordinator.initialize_all([GUILD]).await.unwrap();

    let (sink, rx) = ReplySink::channel(64);
    coordinator
        .reconfigure(GUILD, config(10, 200, "345M"), None, Verbosity::Verbose, &sink)
        .await
        .unwrap();
    let replies = collect(sink, rx).await;
    let texts = texts(&replies);
    assert_eq!(
        texts[..6],
        [
            messages::LIMITS_DISABLED,
            messages::VERBOSE_SETTING,
            messages::VERBOSE_RELEASING,
            messages::VERBOSE_PREINIT,
            messages::VERBOSE_BUILDING,
            messages::VERBOSE_SET,
        ]
    );
    assert_eq!(
        texts[6],
        messages::verbose_cost_warning(&config(10, 200, "345M"), 2000, 100)
    );
    assert_eq!(texts.len(), 7);
}

#[tokio::test]
async fn expensive_configuration_warns_after_success() {
    let coordinator = coordinator();
    coordinator.initialize_all([GUILD]).await.unwrap();

    let (sink, rx) = ReplySink::channel(64);
    coordinator
        .reconfigure(GUILD, config(5, 200, "117M"), Some(1000), Verbosity::Quiet, &sink)
        .await
        .unwrap();
    let replies = collect(sink, rx).await;
    assert_eq!(
        texts(&replies),
        [
            messages::SETTING_CONFIGURATION.to_string(),
            messages::settings_block("Using settings", &config(5, 200, "117M")),
            messages::CONFIGURATION_SET.to_string(),
            messages::PROCESS_INTENSIVE.to_string(),
        ]
    );
}

#[tokio::test]
async fn failed_build_leaves_session_uninitialized() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(1, 50, "117M")).await;
    coordinator
        .engine()
        .fail_build
        .store(true, StdOrdering::SeqCst);

    let (sink, rx) = ReplySink::channel(64);
    let err = coordinator
        .reconfigure(GUILD, config(1, 60, "345M"), Some(1000), Verbosity::Quiet, &sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EngineInitFailure(_)));
    assert!(!texts(&collect(sink, rx).await).contains(&messages::CONFIGURATION_SET));

    let session = coordinator.registry().get(GUILD).unwrap();
    assert_eq!(session.read().status(), SessionStatus::Uninitialized);
    assert!(session.read().handle().is_none());
    assert_eq!(MockEngine::count(&coordinator.engine().live), 0);
    assert!(!coordinator.is_busy());
}

#[tokio::test]
async fn generation_always_sees_the_active_configuration() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(1, 50, "117M")).await;
    talk(&coordinator, None, Verbosity::Quiet).await.0.unwrap();

    let (sink, _rx) = ReplySink::channel(64);
    coordinator
        .reconfigure(GUILD, config(2, 20, "345M"), Some(1000), Verbosity::Quiet, &sink)
        .await
        .unwrap();
    talk(&coordinator, None, Verbosity::Quiet).await.0.unwrap();

    assert_eq!(
        *coordinator.engine().configs_seen.lock(),
        [
            config(1, 50, "117M"),
            config(2, 20, "345M"),
            config(2, 20, "345M")
        ]
    );
    assert_eq!(MockEngine::count(&coordinator.engine().live), 1);
}

#[tokio::test]
async fn guild_left_releases_and_unregisters() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(1, 50, "117M")).await;

    coordinator.on_guild_left(GUILD).await.unwrap();
    let engine = coordinator.engine();
    assert_eq!(MockEngine::count(&engine.disposals), 1);
    assert_eq!(MockEngine::count(&engine.live), 0);
    assert!(matches!(
        coordinator.registry().get(GUILD),
        Err(Error::GuildNotRegistered(GUILD))
    ));
    let (result, _) = talk(&coordinator, None, Verbosity::Quiet).await;
    assert!(matches!(result, Err(Error::GuildNotRegistered(GUILD))));
    assert!(matches!(
        coordinator.on_guild_left(GUILD).await,
        Err(Error::GuildNotRegistered(GUILD))
    ));
}

#[tokio::test]
async fn ready_event_populates_once_but_init_always_does() {
    let coordinator = coordinator();
    assert!(coordinator.on_ready([GUILD]).await.unwrap());
    let (sink, _rx) = ReplySink::channel(64);
    coordinator
        .reconfigure(GUILD, config(1, 50, "117M"), Some(1000), Verbosity::Quiet, &sink)
        .await
        .unwrap();

    assert!(!coordinator.on_ready([GUILD, 7]).await.unwrap());
    assert_eq!(coordinator.registry().guild_ids(), [GUILD]);
    assert!(coordinator.registry().get(GUILD).unwrap().read().is_ready());

    assert!(coordinator.on_guild_joined(7));
    assert!(!coordinator.on_guild_joined(7));

    assert_eq!(coordinator.initialize_all([GUILD, 7, 8]).await.unwrap(), 3);
    assert_eq!(
        coordinator.registry().get(GUILD).unwrap().read().status(),
        SessionStatus::Uninitialized
    );
    // The replaced session's resource was released, not leaked.
    assert_eq!(MockEngine::count(&coordinator.engine().disposals), 1);
    assert_eq!(MockEngine::count(&coordinator.engine().live), 0);
}

#[tokio::test]
async fn shutdown_releases_everything_and_refuses_work() {
    let coordinator = coordinator();
    ready_guild(&coordinator, config(1, 50, "117M")).await;

    coordinator.shutdown().await.unwrap();
    assert!(!coordinator.is_ready());
    assert!(coordinator.registry().is_empty());
    assert_eq!(MockEngine::count(&coordinator.engine().live), 0);

    let (result, _) = talk(&coordinator, None, Verbosity::Quiet).await;
    assert!(matches!(result, Err(Error::SystemNotReady)));
    assert!(matches!(
        coordinator.on_guild_left(GUILD).await,
        Err(Error::ServiceShutdown)
    ));
}
