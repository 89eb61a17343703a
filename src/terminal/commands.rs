//! Terminal command set.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::bus::{Event, EventBus, Subscriber};
use crate::error::HubError;
use crate::manager::RobotManager;
use crate::robot::{source, Msg};

use super::{write_lines, TerminalWriter};

pub struct CommandContext {
    pub writer: TerminalWriter,
    pub manager: Arc<RobotManager>,
    pub bus: Arc<EventBus>,
    pub subscriber: Subscriber,
    pub main_token: CancellationToken,
}

pub enum Outcome {
    Continue,
    Exit,
    Error(String),
}

/// name, description, usage - feeds `help`
const COMMANDS: &[(&str, &str, &str)] = &[
    ("help", "Show available commands", "help [command]"),
    ("robots", "List registered robots", "robots"),
    ("registering", "List robots awaiting admission", "registering"),
    ("status", "Show one robot's state", "status <device_id>"),
    ("send", "Queue a message to a robot", "send <device_id> <msg...>"),
    (
        "stop",
        "Stop the whole program or one robot",
        "stop program|<device_id>",
    ),
    ("subscribe", "Print bus events of a type here", "subscribe <event_type>"),
    ("unsubscribe", "Stop printing a bus event type", "unsubscribe <event_type>"),
    ("publish", "Publish an event on the bus", "publish <event_type> [json]"),
    ("exit", "Close this terminal session", "exit"),
];

pub async fn execute(ctx: &CommandContext, input: &str) -> Outcome {
    let mut tokens = input.split_whitespace();
    let Some(command) = tokens.next() else {
        return Outcome::Continue;
    };
    let args: Vec<&str> = tokens.collect();

    match command {
        "help" => help(ctx, &args).await,
        "robots" => robots(ctx).await,
        "registering" => registering(ctx).await,
        "status" => status(ctx, &args).await,
        "send" => send(ctx, &args).await,
        "stop" => stop(ctx, &args).await,
        "subscribe" => subscribe(ctx, &args).await,
        "unsubscribe" => unsubscribe(ctx, &args).await,
        "publish" => publish(ctx, &args).await,
        "exit" | "quit" => Outcome::Exit,
        unknown => Outcome::Error(format!("{}: {unknown}", HubError::InvalidCommand)),
    }
}

async fn help(ctx: &CommandContext, args: &[&str]) -> Outcome {
    match args.first() {
        None => {
            let mut out = String::from("Available commands:\n");
            for (name, description, _) in COMMANDS {
                out.push_str(&format!("  {name:<12} - {description}\n"));
            }
            out.push_str("\nUse 'help <command>' for usage.\n");
            write_lines(&ctx.writer, &out).await;
            Outcome::Continue
        }
        Some(name) => match COMMANDS.iter().find(|(n, _, _)| n == name) {
            Some((name, description, usage)) => {
                write_lines(
                    &ctx.writer,
                    &format!("Command: {name}\nDescription: {description}\nUsage: {usage}\n"),
                )
                .await;
                Outcome::Continue
            }
            None => Outcome::Error(format!("{}: {name}", HubError::InvalidCommand)),
        },
    }
}

async fn robots(ctx: &CommandContext) -> Outcome {
    let robots = ctx.manager.get_robots();
    if robots.is_empty() {
        write_lines(&ctx.writer, "No robots registered.\n").await;
        return Outcome::Continue;
    }
    let mut out = String::from("Registered robots:\n");
    for robot in robots {
        out.push_str(&format!("  {}\n", robot.describe()));
    }
    write_lines(&ctx.writer, &out).await;
    Outcome::Continue
}

async fn registering(ctx: &CommandContext) -> Outcome {
    let pending = ctx.manager.get_registering_robots();
    if pending.is_empty() {
        write_lines(&ctx.writer, "No robots currently registering.\n").await;
        return Outcome::Continue;
    }
    let mut out = String::from("Registering robots:\n");
    for reg in pending {
        out.push_str(&format!(
            "  {} type={} ip={}\n",
            reg.device_id, reg.robot_type, reg.ip
        ));
    }
    write_lines(&ctx.writer, &out).await;
    Outcome::Continue
}

async fn status(ctx: &CommandContext, args: &[&str]) -> Outcome {
    let Some(&device_id) = args.first() else {
        return Outcome::Error("usage: status <device_id>".to_string());
    };
    match ctx.manager.get_robot(Some(device_id), None) {
        Ok(robot) => {
            write_lines(&ctx.writer, &format!("{}\n", robot.describe())).await;
            Outcome::Continue
        }
        Err(_) => Outcome::Error(format!("robot not found: {device_id}")),
    }
}

async fn send(ctx: &CommandContext, args: &[&str]) -> Outcome {
    let Some((device_id, rest)) = args.split_first() else {
        return Outcome::Error("usage: send <device_id> <msg...>".to_string());
    };
    if rest.is_empty() {
        return Outcome::Error("usage: send <device_id> <msg...>".to_string());
    }
    let msg = Msg::new(rest.join(" "), source::TERMINAL);
    match ctx.manager.send_message(Some(*device_id), None, msg) {
        Ok(()) => {
            write_lines(&ctx.writer, "Message queued.\n").await;
            Outcome::Continue
        }
        Err(e) => Outcome::Error(e.to_string()),
    }
}

async fn stop(ctx: &CommandContext, args: &[&str]) -> Outcome {
    match args.first() {
        None => Outcome::Error("usage: stop program|<device_id>".to_string()),
        Some(&"program") => {
            write_lines(&ctx.writer, "Stopping program...\n").await;
            ctx.main_token.cancel();
            Outcome::Continue
        }
        Some(&device_id) => match ctx.manager.remove_robot(Some(device_id), None) {
            Ok(()) => {
                write_lines(&ctx.writer, &format!("Stopped robot {device_id}.\n")).await;
                Outcome::Continue
            }
            Err(e) => Outcome::Error(e.to_string()),
        },
    }
}

async fn subscribe(ctx: &CommandContext, args: &[&str]) -> Outcome {
    let Some(event_type) = args.first() else {
        return Outcome::Error("usage: subscribe <event_type>".to_string());
    };
    let writer = Arc::clone(&ctx.writer);
    ctx.bus.subscribe(
        event_type,
        Some(ctx.subscriber.clone()),
        Arc::new(move |event: Event| {
            let writer = Arc::clone(&writer);
            tokio::spawn(async move {
                write_lines(
                    &writer,
                    &format!("\nEvent received: {}\nData: {}\n> ", event.event_type, event.data),
                )
                .await;
            });
        }),
    );
    write_lines(&ctx.writer, &format!("Subscribed to event type: {event_type}\n")).await;
    Outcome::Continue
}

async fn unsubscribe(ctx: &CommandContext, args: &[&str]) -> Outcome {
    let Some(event_type) = args.first() else {
        return Outcome::Error("usage: unsubscribe <event_type>".to_string());
    };
    ctx.bus.unsubscribe(event_type, &ctx.subscriber);
    write_lines(
        &ctx.writer,
        &format!("Unsubscribed from event type: {event_type}\n"),
    )
    .await;
    Outcome::Continue
}

async fn publish(ctx: &CommandContext, args: &[&str]) -> Outcome {
    let Some(event_type) = args.first() else {
        return Outcome::Error("usage: publish <event_type> [json]".to_string());
    };
    let data: Value = match args.get(1..) {
        Some(rest) if !rest.is_empty() => {
            let raw = rest.join(" ");
            serde_json::from_str(&raw).unwrap_or_else(|_| json!(raw))
        }
        _ => Value::Null,
    };
    ctx.bus.publish(Event::new(*event_type, data)).await;
    write_lines(&ctx.writer, "Published event\n").await;
    Outcome::Continue
}
