//! Team chaos: teams queue, any member drives on the team's turn

use dashmap::DashMap;
use tracing::info;

use crate::game::GameMode;

use super::queue_mode::decode_moves;
use super::{Decoded, GameModePolicy, JoinDecision, JoinRequest, MessageContext};

pub struct TeamChaosPolicy {
    /// Lowercased member name -> team
    rosters: DashMap<String, String>,
}

impl TeamChaosPolicy {
    pub fn new() -> Self {
        Self {
            rosters: DashMap::new(),
        }
    }

    pub fn team_of(&self, member: &str) -> Option<String> {
        self.rosters
            .get(&member.to_lowercase())
            .map(|t| t.value().clone())
    }
}

impl Default for TeamChaosPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl GameModePolicy for TeamChaosPolicy {
    fn mode(&self) -> GameMode {
        GameMode::TeamChaos
    }

    fn decode_message(&self, ctx: &MessageContext<'_>, text: &str) -> Decoded {
        match decode_moves(ctx, text) {
            // turns belong to teams, not members
            Decoded::GiftTurn(_) => Decoded::Rejected("Teams cannot gift turns".to_string()),
            other => other,
        }
    }

    fn join_rule(&self, request: &JoinRequest) -> JoinDecision {
        let requested = request
            .team
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let team = match (requested, self.team_of(&request.sender)) {
            (Some(team), _) => team.to_string(),
            (None, Some(existing)) => existing,
            (None, None) => return JoinDecision::Denied("Join a team first".to_string()),
        };

        let previous = self
            .rosters
            .insert(request.sender.to_lowercase(), team.clone());
        if previous.as_deref() != Some(team.as_str()) {
            info!(member = %request.sender, team = %team, "Team joined");
        }

        JoinDecision::Allowed { identity: team }
    }

    fn participant_for(&self, sender: &str) -> String {
        self.team_of(sender).unwrap_or_else(|| sender.to_string())
    }
}
