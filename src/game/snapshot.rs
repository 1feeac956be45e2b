//! Snapshot building for network transmission

use crate::ws::protocol::{
    BlockSnapshot, ButtonSnapshot, GameSnapshot, GateSnapshot, PlayerSnapshot, ServerMsg,
};

use super::simulation::Simulation;

/// Public projection of the simulation. Input state and `standing_on`
/// stay on the server.
pub fn build_snapshot(sim: &Simulation) -> GameSnapshot {
    let players = sim
        .players
        .iter()
        .map(|p| PlayerSnapshot {
            id: p.id,
            player_index: p.index,
            x: p.x,
            y: p.y,
            vx: p.vx,
            vy: p.vy,
            width: p.width,
            height: p.height,
            is_grounded: p.is_grounded,
            color: p.color.to_string(),
            character: p.character.clone(),
            supporting: p.supporting.clone(),
        })
        .collect();

    GameSnapshot {
        players,
        platforms: sim.platforms.clone(),
        buttons: sim
            .buttons
            .iter()
            .map(|b| ButtonSnapshot {
                id: b.id.clone(),
                rect: b.rect,
                active: b.active,
            })
            .collect(),
        gates: sim
            .gates
            .iter()
            .map(|g| GateSnapshot {
                id: g.id.clone(),
                rect: g.rect,
                is_open: g.is_open,
            })
            .collect(),
        moveable_blocks: sim
            .blocks
            .iter()
            .map(|b| BlockSnapshot {
                id: b.id.clone(),
                rect: b.rect,
                weight: b.weight,
            })
            .collect(),
        finish_line: sim.finish_line,
        level_id: sim.level_index,
        is_paused: sim.paused,
    }
}

/// Decides which ticks get broadcast
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        let snapshot_interval = snapshot_interval.max(1);
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval,
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used after level changes)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a state update message
    pub fn build(&self, sim: &Simulation) -> ServerMsg {
        ServerMsg::StateUpdate {
            tick: sim.tick,
            game_state: build_snapshot(sim),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{EntityRef, InputState};
    use crate::game::level::LevelCatalog;
    use crate::game::physics::GameConfig;
    use uuid::Uuid;

    fn populated() -> Simulation {
        let catalog = LevelCatalog::builtin().unwrap();
        let mut sim = Simulation::new(GameConfig::default());
        sim.load_level(4, catalog.get(4));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        sim.add_player(a, 0, None);
        sim.add_player(b, 1, Some("fencer.png".into()));
        sim.apply_input(
            a,
            InputState {
                left: true,
                right: false,
                jump: false,
            },
        );
        if let Some(p) = sim.player_mut(b) {
            p.standing_on = Some(EntityRef::Player(a));
        }
        sim
    }

    #[test]
    fn snapshot_mirrors_public_fields_in_join_order() {
        let sim = populated();
        let snap = build_snapshot(&sim);

        assert_eq!(snap.players.len(), 2);
        assert_eq!(snap.players[0].player_index, 0);
        assert_eq!(snap.players[1].player_index, 1);
        assert_eq!(snap.players[1].character, "fencer.png");
        assert_eq!(snap.players[0].color, "#FF0000");
        assert_eq!(snap.platforms.len(), 8);
        assert_eq!(snap.buttons.len(), 2);
        assert_eq!(snap.gates.len(), 2);
        assert_eq!(snap.moveable_blocks[0].weight, 2);
        assert_eq!(snap.level_id, 4);
        assert!(!snap.is_paused);
        assert!(snap.finish_line.is_some());
    }

    #[test]
    fn snapshot_does_not_leak_internal_fields() {
        let sim = populated();
        let json = serde_json::to_string(&build_snapshot(&sim)).unwrap();

        assert!(!json.contains("standing_on"));
        assert!(!json.contains("\"input\""));
        assert!(!json.contains("is_jumping"));
        assert!(json.contains("\"supporting\""));
    }

    #[test]
    fn builder_sends_every_interval() {
        let mut builder = SnapshotBuilder::new(3);
        let sent: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(sent, [false, false, true, false, false, true]);

        builder.force_next();
        assert!(builder.should_send());
    }

    #[test]
    fn zero_interval_sends_every_tick() {
        let mut builder = SnapshotBuilder::new(0);
        assert!(builder.should_send());
        assert!(builder.should_send());
    }
}
