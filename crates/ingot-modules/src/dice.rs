//! Dice rolling.
//!
//! Answers messages of the exact shape `<x>d<y>` with the individual rolls
//! and their sum.

use std::any::Any;
use std::sync::Arc;

use rand::Rng;

use ingot_core::MessageEvent;
use ingot_framework::{
    FilterResult, MessageFilter, Module, ModuleContext, ModuleError, ModuleInfo,
};

const MAX_DICE: u64 = 10;

/// The dice module.
#[derive(Default)]
pub struct Dice;

impl Dice {
    pub fn new() -> Self {
        Self
    }
}

impl Module for Dice {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new("dice", "简单骰子")
    }

    fn init(&self, ctx: ModuleContext) -> Result<(), ModuleError> {
        ctx.bus
            .register_message(vec![dice_filter()], |event: MessageEvent| async move {
                Ok(roll_reply(&event.message))
            });
        Ok(())
    }

    fn help(&self, _event: &MessageEvent) -> String {
        "骰子: xdy, x, y 均为数字, x 需小于等于 10".to_owned()
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn dice_filter() -> MessageFilter {
    Arc::new(|event, _| FilterResult::from_bool(parse_dice(&event.message).is_some()))
}

/// Parses `<x>d<y>` with both sides non-empty, numeric, and non-zero.
fn parse_dice(message: &str) -> Option<(u64, u64)> {
    let (x, y) = message.split_once('d')?;
    if x.is_empty() || y.is_empty() {
        return None;
    }
    if !x.bytes().all(|b| b.is_ascii_digit()) || !y.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let x: u64 = x.parse().ok()?;
    let y: u64 = y.parse().ok()?;
    (x >= 1 && y >= 1).then_some((x, y))
}

fn roll_reply(message: &str) -> Option<String> {
    let (count, sides) = parse_dice(message)?;
    if count > MAX_DICE {
        return Some("太...太大惹".to_owned());
    }

    let mut rng = rand::thread_rng();
    let rolls: Vec<u64> = (0..count).map(|_| rng.gen_range(1..=sides)).collect();
    let sum: u64 = rolls.iter().sum();

    if count == 1 {
        Some(sum.to_string())
    } else {
        let parts: Vec<String> = rolls.iter().map(u64::to_string).collect();
        Some(format!("{}={}", parts.join("+"), sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dice() {
        assert_eq!(parse_dice("2d6"), Some((2, 6)));
        assert_eq!(parse_dice("10d100"), Some((10, 100)));
        assert_eq!(parse_dice("d6"), None);
        assert_eq!(parse_dice("2d"), None);
        assert_eq!(parse_dice("ad6"), None);
        assert_eq!(parse_dice("2d6 extra"), None);
        assert_eq!(parse_dice("0d6"), None);
        assert_eq!(parse_dice("2d0"), None);
        assert_eq!(parse_dice("-1d6"), None);
    }

    #[test]
    fn test_two_dice_reply_shape() {
        for _ in 0..50 {
            let reply = roll_reply("2d6").unwrap();
            let (rolls, sum) = reply.split_once('=').unwrap();
            let values: Vec<u64> = rolls.split('+').map(|n| n.parse().unwrap()).collect();
            assert_eq!(values.len(), 2);
            assert!(values.iter().all(|&n| (1..=6).contains(&n)));
            assert_eq!(sum.parse::<u64>().unwrap(), values.iter().sum::<u64>());
        }
    }

    #[test]
    fn test_single_die_replies_with_bare_number() {
        for _ in 0..50 {
            let reply = roll_reply("1d6").unwrap();
            let value: u64 = reply.parse().unwrap();
            assert!((1..=6).contains(&value));
        }
    }

    #[test]
    fn test_too_many_dice_is_refused() {
        assert_eq!(roll_reply("11d6").unwrap(), "太...太大惹");
    }

    #[tokio::test]
    async fn test_dispatch_through_bus() {
        let fixture = crate::testutil::boot(vec![Arc::new(Dice::new())]).await;

        let reply = fixture
            .dispatch_group_message("2d6")
            .await
            .expect("dice should reply");
        assert!(reply.contains('='));

        assert_eq!(fixture.dispatch_group_message("hello").await, None);
    }
}
