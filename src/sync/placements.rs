//! Live placement broadcast
//!
//! Every edit to a player's pending tiles replaces that player's whole set
//! of live placements: delete everything they have, then insert the current
//! set. Other clients only ever see a full set, never a diff.

use crate::game::validation::PendingTile;
use crate::game::{GameId, PlayerId};
use crate::storage::{LivePlacement, Store, StoreError};
use std::collections::BTreeMap;

/// Build the rows for one player's pending tiles. A cell appears once;
/// the last tile written to it wins.
pub fn rows_for(game_id: &GameId, player_id: &PlayerId, pending: &[PendingTile]) -> Vec<LivePlacement> {
    let mut by_cell = BTreeMap::new();
    for tile in pending {
        by_cell.insert((tile.y, tile.x), tile.letter);
    }
    by_cell
        .into_iter()
        .map(|((y, x), letter)| LivePlacement {
            game_id: game_id.clone(),
            player_id: player_id.clone(),
            x,
            y,
            letter,
        })
        .collect()
}

/// Replace a player's live placements with `pending`
pub fn replace<S: Store + ?Sized>(
    store: &mut S,
    game_id: &GameId,
    player_id: &PlayerId,
    pending: &[PendingTile],
) -> Result<(), StoreError> {
    store.delete_placements(game_id, player_id)?;
    let rows = rows_for(game_id, player_id, pending);
    if !rows.is_empty() {
        store.upsert_placements(&rows)?;
    }
    Ok(())
}

/// Like [`replace`], but failures only get logged. Live placements are a
/// courtesy to other players and never block local play.
pub fn publish<S: Store + ?Sized>(
    store: &mut S,
    game_id: &GameId,
    player_id: &PlayerId,
    pending: &[PendingTile],
) -> bool {
    match replace(store, game_id, player_id, pending) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(game_id = %game_id, player_id = %player_id, error = %e, "live placement broadcast failed");
            false
        }
    }
}
