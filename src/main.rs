use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use petra_ac::{
    object_id, reference_type_id, AccessControl, AccessLevel, Config, DefaultAccessControl, IdentityAccessControl,
    IdentityToken, InMemoryServer, NodeId, OnOffCondition, Session, SessionId, StatusCode, Variant,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<()> {
    petra_ac::init_logging();
    info!("PETRA A&C demo v{} starting", petra_ac::VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };
    info!(
        "{} ({}): {} condition(s)",
        config.server.application_name,
        config.server.application_uri,
        config.conditions.len()
    );

    let runtime = InMemoryServer::new();
    let server = runtime.handle();
    let access = IdentityAccessControl::new(DefaultAccessControl::from_config(&config.access_control), &server);

    // Every published event goes to stdout as one JSON line
    let mut events = runtime.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!("Failed to render event: {}", e),
                },
                Err(RecvError::Lagged(missed)) => warn!("Event printer missed {} events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut sources: HashMap<String, NodeId> = HashMap::new();
    let mut alarms = Vec::new();
    for condition in &config.conditions {
        let source = match sources.get(&condition.source) {
            Some(id) => id.clone(),
            None => {
                let id = runtime
                    .add_event_source(condition.source.as_str())
                    .map_err(|status| anyhow!("source '{}': {}", condition.source, status))?;
                sources.insert(condition.source.clone(), id.clone());
                id
            }
        };

        let parent_reference = condition.exposed.then_some(reference_type_id::HAS_COMPONENT);
        let alarm = OnOffCondition::new(&server, &source, condition.name.as_str(), parent_reference, condition.severity)?;
        alarm
            .on_enabled(log_transition("enabled"), false)?
            .on_about_to_be_acked(admins_only("acknowledge"), false)?
            .on_about_to_be_confirmed(admins_only("confirm"), false)?
            .on_active(log_transition("active"), false)?;
        alarms.push(Arc::new(alarm));
    }

    let first = alarms.first().ok_or_else(|| anyhow!("no conditions configured"))?;
    let alarm_active = runtime
        .add_variable(
            &object_id::OBJECTS_FOLDER,
            "AlarmActive",
            Variant::Boolean(false),
            AccessLevel::CURRENT_READ | AccessLevel::CURRENT_WRITE,
        )
        .map_err(|status| anyhow!("AlarmActive variable: {}", status))?;
    let toggled: Weak<OnOffCondition> = Arc::downgrade(first);
    runtime
        .on_write(&alarm_active, move |_, value| {
            let (Some(alarm), Some(active)) = (toggled.upgrade(), value.as_bool()) else {
                return;
            };
            if let Err(e) = alarm.set_active(alarm.source(), active, None) {
                error!("Failed to toggle {}: {}", alarm.id(), e);
            }
        })
        .map_err(|status| anyhow!("AlarmActive callback: {}", status))?;

    // ------------------------------------------------------------------------
    // Scripted scenario
    // ------------------------------------------------------------------------

    let admin = SessionId::new();
    let guest = SessionId::new();
    for (session, token) in [
        (&admin, IdentityToken::user_name("admin", "admin")),
        (&guest, IdentityToken::user_name("guest", "guest")),
    ] {
        let status = access.activate_session(session, &token);
        if !status.is_good() {
            warn!("Activation of {:?} failed: {}", token, status);
        }
    }

    let write_as = |session: &SessionId, value: bool| {
        let level = access.user_access_level(session, &alarm_active);
        if !level.can_write() {
            warn!("Write to AlarmActive by {} denied ({})", session, level);
            return;
        }
        if let Err(status) = runtime.write_value(&alarm_active, Variant::Boolean(value)) {
            warn!("Write to AlarmActive failed: {}", status);
        }
    };

    write_as(&guest, true);
    write_as(&admin, true);

    let condition = first.id().clone();
    report("guest acknowledge", runtime.acknowledge(&condition, Some(&guest), None));
    report("admin acknowledge", runtime.acknowledge(&condition, Some(&admin), Some("On it")));
    report("admin confirm", runtime.confirm(&condition, Some(&admin), None));

    write_as(&admin, false);

    access.close_session(&guest);
    access.close_session(&admin);

    // Dropping the last handle closes the event channel and ends the printer
    drop(alarms);
    drop(access);
    drop(server);
    drop(runtime);
    if tokio::time::timeout(Duration::from_secs(2), printer).await.is_err() {
        warn!("Event printer did not finish");
    }

    info!("Demo finished");
    Ok(())
}

fn log_transition(what: &'static str) -> impl Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static {
    move |session, source, _| {
        info!(
            "Condition on {} becoming {} (session {})",
            source,
            what,
            session.id().map(|id| id.to_string()).unwrap_or_else(|| "server".into())
        );
        StatusCode::GOOD
    }
}

fn admins_only(what: &'static str) -> impl Fn(&Session, &NodeId, bool) -> StatusCode + Send + Sync + 'static {
    move |session, _, _| {
        if session.is_admin() {
            StatusCode::GOOD
        } else {
            warn!("Non-admin session tried to {}", what);
            StatusCode::BAD_USER_ACCESS_DENIED
        }
    }
}

fn report<T>(step: &str, result: std::result::Result<T, StatusCode>) {
    match result {
        Ok(_) => info!("{}: ok", step),
        Err(status) => warn!("{}: {}", step, status),
    }
}
