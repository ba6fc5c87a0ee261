//! Grammar for the ioquake3 family of server logs (`games.log`).
//!
//! Lines look like `  2:13 Kill: 2 3 7: Sarge killed Klesk by MOD_ROCKET`;
//! the leading `m:ss` game clock is stripped before matching.

use crate::action::Action;
use crate::error::ParserError;
use crate::grammar::Grammar;
use crate::translator::{fields_to_json, EventTranslator, TranslateContext};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use warden_event_system::{keys, Event, EventCatalog, IdentityRef};

/// Slot number the engine uses for `<world>` kills.
const WORLD_CID: &str = "1022";

pub(crate) fn grammar() -> Result<Grammar, ParserError> {
    Grammar::builder("q3a")
        .line_prefix(r"^\s*\d+:\d{2}\s+")
        .noise(r"^-+$")
        .rule("connect", r"^ClientConnect: (?P<cid>\d+)$")
        .rule("userinfo_changed", r"^ClientUserinfoChanged: (?P<cid>\d+) (?P<info>.*)$")
        .rule("userinfo", r"^ClientUserinfo: (?P<cid>\d+) (?P<info>.*)$")
        .rule("begin", r"^ClientBegin: (?P<cid>\d+)$")
        .rule("disconnect", r"^ClientDisconnect: (?P<cid>\d+)$")
        .rule(
            "kill",
            r"^Kill: (?P<acid>\d+) (?P<cid>\d+) (?P<aweap>\d+): (?P<aname>.*) killed (?P<name>.*) by (?P<weapon>\S+)$",
        )
        .rule("item", r"^Item: (?P<cid>\d+) (?P<item>\S+)$")
        .rule("say", r"^say: (?:(?P<cid>\d+) )?(?P<name>[^:]+): (?P<text>.*)$")
        .rule("sayteam", r"^sayteam: (?:(?P<cid>\d+) )?(?P<name>[^:]+): (?P<text>.*)$")
        .rule("tell", r"^tell: (?P<name>.+?) to (?P<tname>.+?): (?P<text>.*)$")
        .rule("init_game", r"^InitGame: ?(?P<info>.*)$")
        .rule("warmup", r"^Warmup:.*$")
        .rule("exit", r"^Exit: (?P<reason>.*)$")
        .rule("shutdown_game", r"^ShutdownGame:.*$")
        .rule(
            "score",
            r"^score: (?P<score>-?\d+)\s+ping: (?P<ping>\d+)\s+client: (?P<cid>\d+) (?P<name>.*)$",
        )
        .rule("action", r"^(?P<kind>[A-Za-z]+):\s*(?P<data>.*)$")
        .build()
}

pub(crate) fn translator(catalog: Arc<EventCatalog>) -> EventTranslator {
    EventTranslator::new(catalog)
        .on("connect", on_connect)
        .on("userinfo_changed", on_userinfo)
        .on("userinfo", on_userinfo)
        .on("begin", on_begin)
        .on("disconnect", on_disconnect)
        .on("kill", on_kill)
        .on("say", on_say)
        .on("sayteam", on_say)
        .on("tell", on_tell)
        .on("init_game", on_init_game)
        .on("warmup", on_warmup)
        .on("exit", on_exit)
        .on("shutdown_game", on_shutdown_game)
        .fallback("item", keys::EVT_CLIENT_ITEM_PICKUP)
        .fallback("score", keys::EVT_CLIENT_SCORE)
        .fallback("action", keys::EVT_GAME_ACTION)
}

/// Parses `\key\value\key\value` info strings.
fn parse_info(info: &str) -> Map<String, Value> {
    let mut parts = info.trim_start_matches('\\').split('\\');
    let mut map = Map::new();
    while let Some(key) = parts.next() {
        if key.is_empty() {
            continue;
        }
        let value = parts.next().unwrap_or_default();
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
    map
}

fn info_str<'a>(info: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    info.get(key).and_then(Value::as_str)
}

fn on_connect(action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    let client = IdentityRef::new(action.field("cid")?);
    ctx.remember(client.clone());
    Some(Event::signal(ctx.event_id(keys::EVT_CLIENT_CONNECT)).with_client(client))
}

fn on_userinfo(action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    let info = parse_info(action.field("info")?);
    let mut client = ctx.client(action.field("cid")?);

    // `n` in ClientUserinfoChanged, `name` in ClientUserinfo.
    if let Some(name) = info_str(&info, "n").or_else(|| info_str(&info, "name")) {
        client.name = Some(name.to_string());
    }
    if let Some(guid) = info_str(&info, "cl_guid") {
        client.guid = Some(guid.to_string());
    }
    ctx.remember(client.clone());

    Some(Event::new(ctx.event_id(keys::EVT_CLIENT_INFO_CHANGE), Value::Object(info)).with_client(client))
}

fn on_begin(action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    let client = ctx.client(action.field("cid")?);
    Some(Event::signal(ctx.event_id(keys::EVT_CLIENT_JOIN)).with_client(client))
}

fn on_disconnect(action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    let cid = action.field("cid")?;
    let client = ctx.forget(cid).unwrap_or_else(|| IdentityRef::new(cid));
    Some(Event::signal(ctx.event_id(keys::EVT_CLIENT_DISCONNECT)).with_client(client))
}

fn on_kill(action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    let attacker = action.field("acid")?;
    let victim_cid = action.field("cid")?;
    let victim = known_or_named(ctx, victim_cid, action.field("name"));
    let data = json!({
        "weapon": action.field("weapon"),
        "weapon_id": action.field("aweap"),
    });

    if attacker == victim_cid || attacker == WORLD_CID {
        return Some(Event::new(ctx.event_id(keys::EVT_CLIENT_SUICIDE), data).with_client(victim));
    }

    let killer = known_or_named(ctx, attacker, action.field("aname"));
    Some(
        Event::new(ctx.event_id(keys::EVT_CLIENT_KILL), data)
            .with_client(killer)
            .with_target(victim),
    )
}

fn on_say(action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    let key = if action.verb() == "sayteam" {
        keys::EVT_CLIENT_TEAM_SAY
    } else {
        keys::EVT_CLIENT_SAY
    };
    let name = action.field("name")?;
    let client = match action.field("cid") {
        Some(cid) => known_or_named(ctx, cid, Some(name)),
        None => by_name(ctx, name),
    };
    Some(Event::new(ctx.event_id(key), json!({ "text": action.field("text")? })).with_client(client))
}

fn on_tell(action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    let sender = by_name(ctx, action.field("name")?);
    let target = by_name(ctx, action.field("tname")?);
    Some(
        Event::new(ctx.event_id(keys::EVT_CLIENT_PRIVATE_SAY), json!({ "text": action.field("text")? }))
            .with_client(sender)
            .with_target(target),
    )
}

fn on_init_game(action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    let info = parse_info(action.field("info").unwrap_or_default());
    Some(Event::new(ctx.event_id(keys::EVT_GAME_ROUND_START), Value::Object(info)))
}

fn on_warmup(_action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    Some(Event::signal(ctx.event_id(keys::EVT_GAME_WARMUP)))
}

fn on_exit(action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    Some(Event::new(ctx.event_id(keys::EVT_GAME_EXIT), fields_to_json(action)))
}

fn on_shutdown_game(_action: &Action, ctx: &mut TranslateContext) -> Option<Event> {
    Some(Event::signal(ctx.event_id(keys::EVT_GAME_ROUND_END)))
}

/// Roster entry for `cid`, or a bare identity carrying the logged name.
fn known_or_named(ctx: &TranslateContext, cid: &str, name: Option<&str>) -> IdentityRef {
    let client = ctx.client(cid);
    match (&client.name, name) {
        (None, Some(name)) => client.with_name(name),
        _ => client,
    }
}

/// Roster entry matching `name`; `cid` is empty when the name is unknown.
fn by_name(ctx: &TranslateContext, name: &str) -> IdentityRef {
    ctx.client_by_name(name)
        .unwrap_or_else(|| IdentityRef::new("").with_name(name))
}
