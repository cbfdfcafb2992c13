use super::permissions::{self, Gate, BOT_NOT_ADMIN_TEXT, GROUP_ONLY_TEXT};
use super::*;
use crate::testutil::{incoming, test_config, user_jid, MockTransport, BOT, GROUP, OWNER};
use whiz_core::message::{ParticipantAction, QuotedMessage, STATUS_BROADCAST_JID};

const STRANGER: &str = "254711111111";

fn gateway(mock: &Arc<MockTransport>, config: BotConfig) -> Gateway {
    let transport: Arc<dyn Transport> = mock.clone();
    Gateway::new(
        transport,
        config,
        Registry::builtin().unwrap(),
        reqwest::Client::new(),
        Instant::now(),
    )
}

// --- Permission gate ---

#[tokio::test]
async fn test_owner_only_by_non_owner_sends_nothing() {
    let mock = Arc::new(MockTransport {
        groups: vec![GROUP.into()],
        ..Default::default()
    });
    let gw = gateway(&mock, test_config());

    gw.handle_message(incoming(&user_jid(STRANGER), STRANGER, "!broadcast hi"))
        .await;
    gw.handle_message(incoming(&user_jid(STRANGER), STRANGER, ".restart"))
        .await;

    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn test_owner_only_by_owner_executes() {
    let mock = Arc::new(MockTransport {
        groups: vec![GROUP.into(), "120363009999999999@g.us".into()],
        ..Default::default()
    });
    let gw = gateway(&mock, test_config());

    gw.handle_message(incoming(&user_jid(OWNER), OWNER, "!bc Server maintenance"))
        .await;

    let sent = mock.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].chat, GROUP);
    assert!(sent[0]
        .body()
        .is_some_and(|b| b.contains("Server maintenance")));
    assert!(sent[2]
        .body()
        .is_some_and(|b| b.starts_with("✅ Broadcast sent to 2/2 groups.")));
}

#[tokio::test]
async fn test_no_owner_configured_denies_everyone() {
    let mock = Arc::new(MockTransport::default());
    let config = BotConfig {
        owner_number: String::new(),
        ..test_config()
    };
    let gw = gateway(&mock, config);

    gw.handle_message(incoming(&user_jid(OWNER), OWNER, "!restart"))
        .await;
    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn test_group_only_in_private_chat_is_refused() {
    let mock = Arc::new(MockTransport::default());
    let gw = gateway(&mock, test_config());

    gw.handle_message(incoming(&user_jid(STRANGER), STRANGER, "!groupinfo"))
        .await;

    let bodies = mock.bodies();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].starts_with(GROUP_ONLY_TEXT));
}

#[tokio::test]
async fn test_admin_command_requires_bot_admin() {
    let mock = Arc::new(MockTransport::default().with_group(&[STRANGER], &[BOT, OWNER]));
    let gw = gateway(&mock, test_config());

    let mut msg = incoming(GROUP, STRANGER, "!promote");
    msg.mentions = vec![user_jid(OWNER)];
    gw.handle_message(msg).await;

    assert!(mock.updates.lock().unwrap().is_empty());
    let bodies = mock.bodies();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].starts_with(BOT_NOT_ADMIN_TEXT));
}

#[tokio::test]
async fn test_admin_command_runs_when_bot_is_admin() {
    let mock = Arc::new(MockTransport::default().with_group(&[BOT], &[STRANGER, OWNER]));
    let gw = gateway(&mock, test_config());

    let mut msg = incoming(GROUP, STRANGER, "!kick");
    msg.quoted = Some(QuotedMessage {
        id: "ABC".into(),
        participant: Some(user_jid(OWNER)),
        text: Some("hello".into()),
        media: None,
    });
    gw.handle_message(msg).await;

    let updates = mock.updates.lock().unwrap().clone();
    assert_eq!(
        updates,
        vec![(
            GROUP.to_string(),
            vec![user_jid(OWNER)],
            ParticipantAction::Remove
        )]
    );
}

#[tokio::test]
async fn test_require_sender_admin() {
    let mock = Arc::new(MockTransport::default().with_group(&[BOT], &[STRANGER]));
    let config = BotConfig {
        require_sender_admin: true,
        ..test_config()
    };
    let registry = Registry::builtin().unwrap();
    let command = registry.lookup("grouplink").unwrap();
    let msg = incoming(GROUP, STRANGER, "!grouplink");

    let gate = permissions::check(command.spec(), &msg, &config, mock.as_ref()).await;
    assert_eq!(gate, Gate::Deny(Some(permissions::SENDER_NOT_ADMIN_TEXT)));
}

// --- Routing ---

#[tokio::test]
async fn test_plain_text_and_unknown_commands_are_ignored() {
    let mock = Arc::new(MockTransport::default());
    let gw = gateway(&mock, test_config());

    gw.handle_message(incoming(&user_jid(STRANGER), STRANGER, "hello there"))
        .await;
    gw.handle_message(incoming(&user_jid(STRANGER), STRANGER, "!nosuchthing"))
        .await;
    gw.handle_message(incoming(&user_jid(STRANGER), STRANGER, "!"))
        .await;

    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn test_alias_and_case_route_to_command() {
    let mock = Arc::new(MockTransport::default());
    let gw = gateway(&mock, test_config());

    gw.handle_message(incoming(&user_jid(STRANGER), STRANGER, "#ALIVE"))
        .await;

    let bodies = mock.bodies();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].starts_with("Pong! 🏓"));
}

#[tokio::test]
async fn test_own_messages_only_dispatched_in_owner_chat() {
    let mock = Arc::new(MockTransport::default());
    let gw = gateway(&mock, test_config());

    let mut elsewhere = incoming(&user_jid(STRANGER), BOT, "!ping");
    elsewhere.from_me = true;
    gw.handle_message(elsewhere).await;
    assert!(mock.sent().is_empty());

    let mut own_chat = incoming(&user_jid(BOT), BOT, "!ping");
    own_chat.from_me = true;
    gw.handle_message(own_chat).await;
    assert_eq!(mock.sent().len(), 1);

    let mut owner_chat = incoming(&user_jid(OWNER), OWNER, "!ping");
    owner_chat.from_me = true;
    gw.handle_message(owner_chat).await;
    assert_eq!(mock.sent().len(), 2);
}

#[tokio::test]
async fn test_handler_error_reports_generic_failure() {
    // groupinfo on a group the transport knows nothing about.
    let mock = Arc::new(MockTransport::default());
    let gw = gateway(&mock, test_config());

    gw.handle_message(incoming(GROUP, STRANGER, "!groupinfo"))
        .await;

    let sent = mock.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].body(),
        Some("⚠️ An error occurred while running `groupinfo`.")
    );
    assert_eq!(sent[0].quoted.as_ref().map(|k| k.id.as_str()), Some("3EB0C0FFEE"));
}

// --- Status reactions ---

#[tokio::test]
async fn test_status_update_gets_fire_reaction() {
    let mock = Arc::new(MockTransport::default());
    let gw = gateway(&mock, test_config());

    gw.handle_message(incoming(STATUS_BROADCAST_JID, STRANGER, ""))
        .await;

    let sent = mock.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0].content {
        MessageContent::Reaction { target, emoji } => {
            assert_eq!(emoji, "🔥");
            assert_eq!(target.chat, STATUS_BROADCAST_JID);
            assert_eq!(target.participant.as_deref(), Some(user_jid(STRANGER).as_str()));
        }
        other => panic!("expected reaction, got {other:?}"),
    }
}

#[tokio::test]
async fn test_status_reaction_skips_own_and_disabled() {
    let mock = Arc::new(MockTransport::default());
    let gw = gateway(&mock, test_config());
    let mut own = incoming(STATUS_BROADCAST_JID, BOT, "");
    own.from_me = true;
    gw.handle_message(own).await;
    assert!(mock.sent().is_empty());

    let mock = Arc::new(MockTransport::default());
    let config = BotConfig {
        auto_like_status: false,
        ..test_config()
    };
    let gw = gateway(&mock, config);
    gw.handle_message(incoming(STATUS_BROADCAST_JID, STRANGER, "!ping"))
        .await;
    assert!(mock.sent().is_empty());
}

// --- Per-chat serialization ---

#[tokio::test]
async fn test_serialized_dispatch_handles_every_message() {
    let mock = Arc::new(MockTransport::default());
    let config = BotConfig {
        serialize_per_chat: true,
        ..test_config()
    };
    let gw = Arc::new(gateway(&mock, config));

    let chat = user_jid(STRANGER);
    let first = tokio::spawn(gw.clone().dispatch_message(incoming(&chat, STRANGER, "!ping")));
    let second = tokio::spawn(gw.clone().dispatch_message(incoming(&chat, STRANGER, "!echo hi")));
    let _ = first.await;
    let _ = second.await;

    // Buffered messages are drained by whichever task held the chat.
    for _ in 0..50 {
        if mock.sent().len() == 2 && gw.active_chats.lock().await.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(mock.sent().len(), 2);
    assert!(gw.active_chats.lock().await.is_empty());
}

#[test]
fn test_startup_text() {
    let config = BotConfig {
        owner_name: "Whiz".into(),
        repo_url: "https://github.com/twoem/whizbotpro".into(),
        ..Default::default()
    };
    assert_eq!(
        startup_text(&config, "5 minutes"),
        "Hello Whiz 🤗\nYour Bot is running perfectly 💥\nRepo: https://github.com/twoem/whizbotpro\nUptime: 5 minutes"
    );
}
