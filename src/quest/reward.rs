//! Quest Rewards
//!
//! Rewards are extensions given when a task, stage or quest completes. The
//! stage-link reward is special: instead of touching the player it asks the
//! quest handler to attach a floating stage to the quest.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::{QuestId, StageId};
use crate::extension::{Extension, ExtensionBase};
use crate::player::QPlayer;

/// Side effect of completing part of a quest
pub trait Reward: Extension {
    /// Apply the reward to the player in `ctx`
    fn give(&self, ctx: &mut RewardContext<'_>, setting: &Value);

    /// Whether `setting` is a valid setting for this reward
    fn accepts(&self, _setting: &Value) -> bool {
        true
    }

    /// Floating stage this reward attaches, if it is a stage link
    fn link_target(&self, _setting: &Value) -> Option<StageId> {
        None
    }
}

/// Player and quest a reward is given for
pub struct RewardContext<'a> {
    pub player: &'a mut QPlayer,
    pub quest_id: QuestId,
    links: Vec<StageId>,
}

impl<'a> RewardContext<'a> {
    pub fn new(player: &'a mut QPlayer, quest_id: QuestId) -> Self {
        Self {
            player,
            quest_id,
            links: Vec::new(),
        }
    }

    /// Request that `stage` be linked into the quest for this player
    pub fn link(&mut self, stage: StageId) {
        if !self.links.contains(&stage) {
            self.links.push(stage);
        }
    }

    /// Link requests collected so far, in request order
    pub fn take_links(&mut self) -> Vec<StageId> {
        std::mem::take(&mut self.links)
    }
}

/// A reward paired with the setting an author supplied for it
#[derive(Debug, Clone)]
pub struct RewardWrapper {
    reward: Arc<dyn Reward>,
    setting: Value,
}

impl RewardWrapper {
    pub fn new(reward: Arc<dyn Reward>, setting: Value) -> Self {
        Self { reward, setting }
    }

    pub fn reward(&self) -> &Arc<dyn Reward> {
        &self.reward
    }

    pub fn setting(&self) -> &Value {
        &self.setting
    }

    pub fn give(&self, ctx: &mut RewardContext<'_>) {
        self.reward.give(ctx, &self.setting);
    }

    pub fn accepts(&self) -> bool {
        self.reward.accepts(&self.setting)
    }

    pub fn link_target(&self) -> Option<StageId> {
        self.reward.link_target(&self.setting)
    }
}

impl PartialEq for RewardWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.reward.base() == other.reward.base() && self.setting == other.setting
    }
}

impl Eq for RewardWrapper {}

impl Hash for RewardWrapper {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reward.base().hash(state);
        self.setting.to_string().hash(state);
    }
}

// ============================================================================
// Built-in rewards
// ============================================================================

pub fn experience() -> Box<dyn Reward> {
    Box::new(ExperienceReward::new())
}

pub fn gold() -> Box<dyn Reward> {
    Box::new(GoldReward::new())
}

pub fn item() -> Box<dyn Reward> {
    Box::new(ItemReward::new())
}

pub fn stage_link() -> Box<dyn Reward> {
    Box::new(StageLinkReward::new())
}

macro_rules! extension_impl {
    ($name:ident) => {
        impl Extension for $name {
            fn base(&self) -> &ExtensionBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut ExtensionBase {
                &mut self.base
            }
        }
    };
}

fn non_negative(setting: &Value) -> Option<i64> {
    setting.as_i64().filter(|amount| *amount >= 0)
}

/// Grants experience points
#[derive(Debug)]
pub struct ExperienceReward {
    base: ExtensionBase,
}

impl ExperienceReward {
    pub fn new() -> Self {
        Self {
            base: ExtensionBase::new("Experience", "Grants experience points"),
        }
    }
}

impl Default for ExperienceReward {
    fn default() -> Self {
        Self::new()
    }
}

extension_impl!(ExperienceReward);

impl Reward for ExperienceReward {
    fn give(&self, ctx: &mut RewardContext<'_>, setting: &Value) {
        if let Some(amount) = non_negative(setting) {
            ctx.player.grant_exp(amount);
        }
    }

    fn accepts(&self, setting: &Value) -> bool {
        non_negative(setting).is_some()
    }
}

/// Grants gold
#[derive(Debug)]
pub struct GoldReward {
    base: ExtensionBase,
}

impl GoldReward {
    pub fn new() -> Self {
        Self {
            base: ExtensionBase::new("Gold", "Grants gold coins"),
        }
    }
}

impl Default for GoldReward {
    fn default() -> Self {
        Self::new()
    }
}

extension_impl!(GoldReward);

impl Reward for GoldReward {
    fn give(&self, ctx: &mut RewardContext<'_>, setting: &Value) {
        if let Some(amount) = non_negative(setting) {
            ctx.player.grant_gold(amount);
        }
    }

    fn accepts(&self, setting: &Value) -> bool {
        non_negative(setting).is_some()
    }
}

/// Grants items. Setting is `"item_id"` or `{ id = "item_id", count = n }`.
#[derive(Debug)]
pub struct ItemReward {
    base: ExtensionBase,
}

impl ItemReward {
    pub fn new() -> Self {
        Self {
            base: ExtensionBase::new("Item", "Grants one or more items"),
        }
    }

    fn parse(setting: &Value) -> Option<(&str, u32)> {
        match setting {
            Value::String(id) if !id.is_empty() => Some((id.as_str(), 1)),
            Value::Object(map) => {
                let id = map.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())?;
                let count = match map.get("count") {
                    Some(count) => u32::try_from(count.as_u64()?).ok()?,
                    None => 1,
                };
                (count > 0).then_some((id, count))
            }
            _ => None,
        }
    }
}

impl Default for ItemReward {
    fn default() -> Self {
        Self::new()
    }
}

extension_impl!(ItemReward);

impl Reward for ItemReward {
    fn give(&self, ctx: &mut RewardContext<'_>, setting: &Value) {
        if let Some((id, count)) = Self::parse(setting) {
            ctx.player.grant_items(id, count);
        }
    }

    fn accepts(&self, setting: &Value) -> bool {
        Self::parse(setting).is_some()
    }
}

/// Attaches a floating stage to the quest. Setting is the stage UUID.
#[derive(Debug)]
pub struct StageLinkReward {
    base: ExtensionBase,
}

impl StageLinkReward {
    pub fn new() -> Self {
        Self {
            base: ExtensionBase::new(
                "Stage link",
                "Opens a new stage of the quest for the player",
            ),
        }
    }

    fn target(setting: &Value) -> Option<StageId> {
        setting
            .as_str()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(StageId)
    }
}

impl Default for StageLinkReward {
    fn default() -> Self {
        Self::new()
    }
}

extension_impl!(StageLinkReward);

impl Reward for StageLinkReward {
    fn give(&self, ctx: &mut RewardContext<'_>, setting: &Value) {
        if let Some(stage) = Self::target(setting) {
            ctx.link(stage);
        }
    }

    fn accepts(&self, setting: &Value) -> bool {
        Self::target(setting).is_some()
    }

    fn link_target(&self, setting: &Value) -> Option<StageId> {
        Self::target(setting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{ExtensionId, Owner, Settings};
    use crate::player::PlayerId;
    use std::sync::Weak;

    fn registered(mut reward: Box<dyn Reward>, identifier: &str) -> Arc<dyn Reward> {
        reward.base_mut().register(
            ExtensionId::new(),
            identifier,
            Owner::Builtin,
            Weak::new(),
            Weak::new(),
            Weak::new(),
            &Settings::new(),
        );
        Arc::from(reward)
    }

    #[test]
    fn test_currency_rewards() {
        let mut player = QPlayer::new(PlayerId::new(), "Alice");
        let mut ctx = RewardContext::new(&mut player, QuestId::new());

        RewardWrapper::new(registered(experience(), "experience"), Value::from(150)).give(&mut ctx);
        RewardWrapper::new(registered(gold(), "gold"), Value::from(40)).give(&mut ctx);
        RewardWrapper::new(registered(gold(), "gold"), Value::from(-5)).give(&mut ctx);

        assert_eq!(player.exp, 150);
        assert_eq!(player.gold, 40);
    }

    #[test]
    fn test_large_rewards_saturate() {
        let exp = RewardWrapper::new(registered(experience(), "experience"), Value::from(i64::MAX));
        let coins = RewardWrapper::new(registered(gold(), "gold"), Value::from(i64::MAX));
        let items = registered(item(), "item");
        let stack = serde_json::json!({ "id": "arrow", "count": u32::MAX });
        assert!(exp.accepts());
        assert!(items.accepts(&stack));

        let mut player = QPlayer::new(PlayerId::new(), "Alice");
        let mut ctx = RewardContext::new(&mut player, QuestId::new());
        for _ in 0..2 {
            exp.give(&mut ctx);
            coins.give(&mut ctx);
            items.give(&mut ctx, &stack);
        }

        assert_eq!(player.exp, i64::MAX);
        assert_eq!(player.gold, i64::MAX);
        assert_eq!(player.items.get("arrow"), Some(&u32::MAX));
    }

    #[test]
    fn test_item_settings() {
        let reward = registered(item(), "item");
        assert!(reward.accepts(&Value::from("health_potion")));
        assert!(reward.accepts(&serde_json::json!({ "id": "slime_core", "count": 3 })));
        assert!(!reward.accepts(&serde_json::json!({ "count": 3 })));
        assert!(!reward.accepts(&serde_json::json!({ "id": "slime_core", "count": 0 })));
        assert!(!reward.accepts(&Value::from(7)));

        let mut player = QPlayer::new(PlayerId::new(), "Alice");
        let mut ctx = RewardContext::new(&mut player, QuestId::new());
        reward.give(&mut ctx, &serde_json::json!({ "id": "slime_core", "count": 3 }));
        reward.give(&mut ctx, &Value::from("slime_core"));
        assert_eq!(player.items.get("slime_core"), Some(&4));
    }

    #[test]
    fn test_stage_link_requests_link() {
        let target = StageId::new();
        let wrapper = RewardWrapper::new(
            registered(stage_link(), "stage_link"),
            Value::from(target.to_string()),
        );
        assert!(wrapper.accepts());
        assert_eq!(wrapper.link_target(), Some(target));

        let mut player = QPlayer::new(PlayerId::new(), "Alice");
        let mut ctx = RewardContext::new(&mut player, QuestId::new());
        wrapper.give(&mut ctx);
        wrapper.give(&mut ctx);
        assert_eq!(ctx.take_links(), vec![target]);
        assert!(ctx.take_links().is_empty());

        let bad = RewardWrapper::new(registered(stage_link(), "stage_link"), Value::from("nope"));
        assert!(!bad.accepts());
        assert_eq!(bad.link_target(), None);
    }

    #[test]
    fn test_wrapper_equality() {
        let reward = registered(gold(), "gold");
        let a = RewardWrapper::new(reward.clone(), Value::from(10));
        let b = RewardWrapper::new(reward.clone(), Value::from(10));
        let c = RewardWrapper::new(reward, Value::from(20));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, RewardWrapper::new(registered(gold(), "gold"), Value::from(10)));
    }
}
