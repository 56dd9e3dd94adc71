//! The repeater.
//!
//! Watches group chatter and joins in when the group keeps repeating the
//! same message: after a random number of repetitions the bot re-sends the
//! message once, after a short random delay (skipped when someone else
//! already broke the streak).  Messages carrying mention/share/music/
//! anonymous/voice tags are never repeated.
//!
//! Opt-in per group: the module is disabled by default.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use ingot_core::{BoxedGateway, MessageEvent, markup};
use ingot_framework::{Module, ModuleContext, ModuleError, ModuleInfo, filters};

/// Tag types that must never be parroted back.
const BLACKLISTED_TAGS: &[&str] = &["at", "share", "music", "anonymous", "record"];

struct RepeatInfo {
    last_message: String,
    repeat_count: u32,
    sent: bool,
}

/// Per-group repeat tracking.
#[derive(Default)]
pub struct Repeater {
    groups: Arc<Mutex<HashMap<i64, RepeatInfo>>>,
}

impl Repeater {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Module for Repeater {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new("repeater", "复读机").disabled_by_default()
    }

    fn init(&self, ctx: ModuleContext) -> Result<(), ModuleError> {
        let groups = Arc::clone(&self.groups);
        let gateway = Arc::clone(&ctx.gateway);
        ctx.bus
            .register_message(vec![filters::group()], move |event: MessageEvent| {
                let groups = Arc::clone(&groups);
                let gateway = Arc::clone(&gateway);
                async move {
                    on_group_message(&groups, &gateway, &event);
                    Ok(None)
                }
            });
        Ok(())
    }

    fn help(&self, _event: &MessageEvent) -> String {
        String::new()
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn on_group_message(
    groups: &Arc<Mutex<HashMap<i64, RepeatInfo>>>,
    gateway: &BoxedGateway,
    event: &MessageEvent,
) {
    let Some(group_id) = event.group_id else {
        return;
    };
    if has_blacklisted_tag(&event.message) {
        return;
    }

    let mut rng = rand::thread_rng();

    if rng.gen_range(0..100) == 50 {
        debug!(group = group_id, "Lucky repeat");
        send_repeat(gateway, group_id, event.message.clone());
        return;
    }

    let threshold = rng.gen_range(3..7);
    let delay = Duration::from_millis(rng.gen_range(5_000..10_000));
    let due = {
        let mut map = groups.lock();
        let info = map.entry(group_id).or_insert_with(|| RepeatInfo {
            last_message: String::new(),
            repeat_count: 0,
            sent: true,
        });
        track_repetition(info, &event.message, threshold)
    };

    if due {
        let groups = Arc::clone(groups);
        let gateway = Arc::clone(gateway);
        let message = event.message.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_due = {
                let mut map = groups.lock();
                match map.get_mut(&group_id) {
                    Some(info) if !info.sent && info.last_message == message => {
                        info.sent = true;
                        true
                    }
                    _ => false,
                }
            };
            if still_due {
                send_repeat(&gateway, group_id, message);
            }
        });
    }
}

/// Updates the streak for one message; returns whether the repeat is due.
fn track_repetition(info: &mut RepeatInfo, message: &str, threshold: u32) -> bool {
    if message == info.last_message {
        info.repeat_count += 1;
    } else {
        info.repeat_count = 0;
        info.last_message = message.to_owned();
        info.sent = false;
    }

    if !info.sent && info.repeat_count > threshold {
        info.repeat_count = 0;
        true
    } else {
        false
    }
}

/// `true` when the message carries a tag type we refuse to repeat, or does
/// not parse at all.
fn has_blacklisted_tag(message: &str) -> bool {
    match markup::parse(message) {
        Ok(segments) => segments
            .iter()
            .filter_map(markup::Segment::as_tag)
            .any(|tag| BLACKLISTED_TAGS.contains(&tag.name())),
        Err(_) => true,
    }
}

fn send_repeat(gateway: &BoxedGateway, group_id: i64, message: String) {
    let gateway = Arc::clone(gateway);
    tokio::spawn(async move {
        if let Err(e) = gateway.send_group(group_id, &message).await {
            debug!(group = group_id, error = %e, "Repeat send failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_info() -> RepeatInfo {
        RepeatInfo {
            last_message: String::new(),
            repeat_count: 0,
            sent: true,
        }
    }

    #[test]
    fn test_streak_fires_once_past_threshold() {
        let mut info = fresh_info();
        // First sighting starts the streak.
        assert!(!track_repetition(&mut info, "ha", 3));
        // Repeats 1..=3 stay quiet, the 4th crosses threshold 3.
        assert!(!track_repetition(&mut info, "ha", 3));
        assert!(!track_repetition(&mut info, "ha", 3));
        assert!(!track_repetition(&mut info, "ha", 3));
        assert!(track_repetition(&mut info, "ha", 3));
    }

    #[test]
    fn test_new_message_resets_streak() {
        let mut info = fresh_info();
        for _ in 0..3 {
            track_repetition(&mut info, "ha", 3);
        }
        assert!(!track_repetition(&mut info, "ho", 3));
        assert_eq!(info.repeat_count, 0);
        assert_eq!(info.last_message, "ho");
    }

    #[test]
    fn test_sent_streak_stays_quiet() {
        let mut info = fresh_info();
        for _ in 0..5 {
            track_repetition(&mut info, "ha", 3);
        }
        info.sent = true;
        for _ in 0..10 {
            assert!(!track_repetition(&mut info, "ha", 3));
        }
    }

    #[test]
    fn test_blacklisted_tags() {
        assert!(has_blacklisted_tag("hi [CQ:at,qq=10000]"));
        assert!(has_blacklisted_tag("[CQ:record,file=x.amr]"));
        assert!(!has_blacklisted_tag("plain text"));
        assert!(!has_blacklisted_tag("picture [CQ:image,file=a.jpg]"));
        // Unparseable markup is treated as off-limits.
        assert!(has_blacklisted_tag("[CQ:broken"));
    }
}
