//! Board and gauge registry with relative-weight caps.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use tideway_core::constants::{DEFAULT_GAUGE_CAP, MAX_GAUGE_CAP};
use tideway_core::error::VoteError;
use tideway_core::types::{AccountId, Amount, BoardId};

/// A registered reward board and its bound distributor.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Board {
    pub id: BoardId,
    pub board: AccountId,
    pub distributor: AccountId,
}

/// Registry of boards, their gauges, and per-gauge weight caps.
///
/// Caps apply prospectively only: changing one never rewrites weights
/// already frozen for past periods, since consumers snapshot the cap at
/// allocation time.
#[derive(Clone, Debug, Default)]
pub struct GaugeRegistry {
    next_board_id: BoardId,
    boards: BTreeMap<BoardId, Board>,
    board_accounts: HashMap<AccountId, BoardId>,
    distributor_board: HashMap<AccountId, BoardId>,
    gauge_board: HashMap<AccountId, BoardId>,
    gauge_caps: HashMap<AccountId, Amount>,
    killed: HashSet<AccountId>,
    default_cap: Amount,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self {
            next_board_id: 1,
            default_cap: DEFAULT_GAUGE_CAP,
            ..Self::default()
        }
    }

    /// Id the next registered board will receive.
    pub fn next_board_id(&self) -> BoardId {
        self.next_board_id
    }

    pub fn default_cap(&self) -> Amount {
        self.default_cap
    }

    pub fn board(&self, id: BoardId) -> Option<&Board> {
        self.boards.get(&id)
    }

    pub fn boards(&self) -> impl Iterator<Item = &Board> {
        self.boards.values()
    }

    pub fn gauge_board_id(&self, gauge: &AccountId) -> Option<BoardId> {
        self.gauge_board.get(gauge).copied()
    }

    pub fn is_listed(&self, gauge: &AccountId) -> bool {
        self.gauge_board.contains_key(gauge)
    }

    pub fn is_killed(&self, gauge: &AccountId) -> bool {
        self.killed.contains(gauge)
    }

    /// The cap in force for a gauge: its override, or the default.
    pub fn cap_of(&self, gauge: &AccountId) -> Amount {
        self.gauge_caps
            .get(gauge)
            .copied()
            .unwrap_or(self.default_cap)
    }

    fn check_cap(cap: Amount) -> Result<(), VoteError> {
        if cap == 0 || cap > MAX_GAUGE_CAP {
            return Err(VoteError::InvalidCap(cap));
        }
        Ok(())
    }

    /// Register a board/distributor pair, returning the new board id.
    pub fn add_board(
        &mut self,
        board: AccountId,
        distributor: AccountId,
    ) -> Result<BoardId, VoteError> {
        if board.is_zero() || distributor.is_zero() {
            return Err(VoteError::ZeroAccount);
        }
        if self.board_accounts.contains_key(&board) {
            return Err(VoteError::BoardAlreadyListed(board));
        }
        if self.distributor_board.contains_key(&distributor) {
            return Err(VoteError::DistributorAlreadyBound(distributor));
        }
        let id = self.next_board_id;
        self.next_board_id += 1;
        self.boards.insert(id, Board { id, board, distributor });
        self.board_accounts.insert(board, id);
        self.distributor_board.insert(distributor, id);
        Ok(id)
    }

    /// Rebind a board to a new distributor.
    pub fn update_distributor(
        &mut self,
        id: BoardId,
        distributor: AccountId,
    ) -> Result<(), VoteError> {
        if distributor.is_zero() {
            return Err(VoteError::ZeroAccount);
        }
        if self.distributor_board.contains_key(&distributor) {
            return Err(VoteError::DistributorAlreadyBound(distributor));
        }
        let entry = self
            .boards
            .get_mut(&id)
            .ok_or(VoteError::UnknownBoard(id))?;
        self.distributor_board.remove(&entry.distributor);
        entry.distributor = distributor;
        self.distributor_board.insert(distributor, id);
        Ok(())
    }

    pub fn set_default_cap(&mut self, cap: Amount) -> Result<(), VoteError> {
        Self::check_cap(cap)?;
        self.default_cap = cap;
        Ok(())
    }

    /// Register a gauge under a board. `cap` of `None` inherits the
    /// default cap at read time.
    pub fn add_gauge(
        &mut self,
        gauge: AccountId,
        board: BoardId,
        cap: Option<Amount>,
    ) -> Result<(), VoteError> {
        if gauge.is_zero() {
            return Err(VoteError::ZeroAccount);
        }
        if !self.boards.contains_key(&board) {
            return Err(VoteError::UnknownBoard(board));
        }
        if self.gauge_board.contains_key(&gauge) {
            return Err(VoteError::AlreadyListed(gauge));
        }
        if let Some(cap) = cap {
            Self::check_cap(cap)?;
            self.gauge_caps.insert(gauge, cap);
        }
        self.gauge_board.insert(gauge, board);
        Ok(())
    }

    /// Override (or re-override) a live gauge's cap.
    pub fn update_gauge_cap(&mut self, gauge: AccountId, cap: Amount) -> Result<(), VoteError> {
        if !self.is_listed(&gauge) {
            return Err(VoteError::NotListed(gauge));
        }
        if self.is_killed(&gauge) {
            return Err(VoteError::Killed(gauge));
        }
        Self::check_cap(cap)?;
        self.gauge_caps.insert(gauge, cap);
        Ok(())
    }

    /// Kill a gauge: weight reads become zero, new votes are rejected,
    /// removals stay allowed.
    pub fn kill_gauge(&mut self, gauge: AccountId) -> Result<(), VoteError> {
        if !self.is_listed(&gauge) {
            return Err(VoteError::NotListed(gauge));
        }
        if !self.killed.insert(gauge) {
            return Err(VoteError::Killed(gauge));
        }
        Ok(())
    }

    pub fn unkill_gauge(&mut self, gauge: AccountId) -> Result<(), VoteError> {
        if !self.is_listed(&gauge) {
            return Err(VoteError::NotListed(gauge));
        }
        if !self.killed.remove(&gauge) {
            return Err(VoteError::NotKilled(gauge));
        }
        Ok(())
    }
}
