pub mod memo;
pub mod rules;

use crate::common::constants::MAX_ADJ;
use crate::common::types::AppGroup;
use crate::core::config::ScoringParams;
use crate::core::state::{AppRecord, ProcessRecord};
use memo::AdjMemo;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Strict,
    StrictSecondary,
    Balance,
    #[default]
    BalancePlus,
    Negative,
    SimpleLmkBalance,
    SimpleLmkBalancePlus,
}

type ScoreFn = fn(&ScoringParams, i32) -> i32;

/// Dispatch row for one policy kind.
pub struct PolicyTable {
    pub main: ScoreFn,
    pub high_priority_sub: ScoreFn,
    /// Replaces `main` for important system apps.
    pub important_main: Option<ScoreFn>,
    pub raises_ceiling: bool,
    /// `main` is a pure function of the raw value worth caching.
    pub memoize_main: bool,
}

static STRICT: PolicyTable = PolicyTable {
    main: rules::strict_main,
    high_priority_sub: rules::strict_high_priority_sub,
    important_main: None,
    raises_ceiling: false,
    memoize_main: false,
};

static STRICT_SECONDARY: PolicyTable = PolicyTable {
    main: rules::strict_main,
    high_priority_sub: rules::balance_plus_high_priority_sub,
    important_main: None,
    raises_ceiling: true,
    memoize_main: false,
};

static BALANCE: PolicyTable = PolicyTable {
    main: rules::balance_main,
    high_priority_sub: rules::balance_high_priority_sub,
    important_main: None,
    raises_ceiling: true,
    memoize_main: false,
};

static BALANCE_PLUS: PolicyTable = PolicyTable {
    main: rules::balance_plus_main,
    high_priority_sub: rules::balance_plus_high_priority_sub,
    important_main: None,
    raises_ceiling: true,
    memoize_main: true,
};

static NEGATIVE: PolicyTable = PolicyTable {
    main: rules::negative_main,
    high_priority_sub: rules::negative_high_priority_sub,
    important_main: None,
    raises_ceiling: true,
    memoize_main: false,
};

static SIMPLE_LMK_BALANCE: PolicyTable = PolicyTable {
    main: rules::balance_main,
    high_priority_sub: rules::balance_high_priority_sub,
    important_main: Some(rules::simple_lmk_tier),
    raises_ceiling: true,
    memoize_main: false,
};

static SIMPLE_LMK_BALANCE_PLUS: PolicyTable = PolicyTable {
    main: rules::balance_plus_main,
    high_priority_sub: rules::balance_plus_high_priority_sub,
    important_main: Some(rules::simple_lmk_tier),
    raises_ceiling: true,
    memoize_main: true,
};

impl PolicyKind {
    pub const fn table(self) -> &'static PolicyTable {
        match self {
            Self::Strict => &STRICT,
            Self::StrictSecondary => &STRICT_SECONDARY,
            Self::Balance => &BALANCE,
            Self::BalancePlus => &BALANCE_PLUS,
            Self::Negative => &NEGATIVE,
            Self::SimpleLmkBalance => &SIMPLE_LMK_BALANCE,
            Self::SimpleLmkBalancePlus => &SIMPLE_LMK_BALANCE_PLUS,
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Strict => "strict",
            Self::StrictSecondary => "strict_secondary",
            Self::Balance => "balance",
            Self::BalancePlus => "balance_plus",
            Self::Negative => "negative",
            Self::SimpleLmkBalance => "simple_lmk_balance",
            Self::SimpleLmkBalancePlus => "simple_lmk_balance_plus",
        };
        f.write_str(s)
    }
}

/// How a process is treated by the default scoring path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_main: bool,
    pub high_priority: bool,
    pub important_system: bool,
    /// Main process of a UI-gated app that went to the background without
    /// ever showing UI.
    pub hidden: bool,
}

impl Classification {
    pub fn of(app: &AppRecord, process: &ProcessRecord, high_priority: bool, important: bool) -> Self {
        let high_priority = high_priority || process.is_main_process;
        Self {
            is_main: process.is_main_process,
            high_priority,
            important_system: important && app.is_system_app,
            hidden: process.is_main_process
                && app.ui_gated
                && app.group() == AppGroup::Idle
                && !process.has_shown_ui(),
        }
    }
}

/// Stateful front of the policy table: memo caches plus the process-mutating
/// steps (subprocess fixing, ceiling management).
#[derive(Default)]
pub struct ScoringEngine {
    main_memo: AdjMemo,
    hidden_memo: AdjMemo,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop memoized results after scoring parameters change.
    pub fn invalidate(&self) {
        self.main_memo.clear();
        self.hidden_memo.clear();
    }

    pub fn compute_main_process_adj(
        &self,
        kind: PolicyKind,
        params: &ScoringParams,
        raw: i32,
        important_system: bool,
    ) -> i32 {
        let table = kind.table();
        if important_system && let Some(tier) = table.important_main {
            return tier(params, raw);
        }
        if table.memoize_main {
            self.main_memo.get_or_compute(raw, || (table.main)(params, raw))
        } else {
            (table.main)(params, raw)
        }
    }

    pub fn compute_high_priority_subprocess_adj(
        &self,
        kind: PolicyKind,
        params: &ScoringParams,
        raw: i32,
    ) -> i32 {
        let table = kind.table();
        if table.memoize_main {
            let main = self.main_memo.get_or_compute(raw, || (table.main)(params, raw));
            main.saturating_add(params.subprocess_offset)
        } else {
            (table.high_priority_sub)(params, raw)
        }
    }

    /// Ordinary subprocesses never go below the sentinel once they hit it.
    pub fn compute_subprocess_adj(
        &self,
        params: &ScoringParams,
        process: &ProcessRecord,
        raw: i32,
    ) -> i32 {
        if raw >= params.min_subprocess_adj {
            return raw;
        }
        if process.mark_fixed() && process.reset_ceiling() {
            debug!(target: "adjwarden::policy", "{} fixed at {}, ceiling reset", process.process_name, params.min_subprocess_adj);
        }
        params.min_subprocess_adj
    }

    pub fn compute_hidden_adj(&self, params: &ScoringParams, raw: i32) -> i32 {
        self.hidden_memo
            .get_or_compute(raw, || rules::hidden_high_priority(params, raw))
    }

    /// Lift the host ceiling before a lenient score so the host does not undo it.
    pub fn check_and_set_default_max_adj_if_need(&self, process: &ProcessRecord) -> bool {
        let raised = process.raise_ceiling(MAX_ADJ);
        if raised {
            debug!(target: "adjwarden::policy", "{} ceiling raised to {}", process.process_name, MAX_ADJ);
        }
        raised
    }

    /// Default (`OTHER`) path.
    pub fn compute_default(
        &self,
        kind: PolicyKind,
        params: &ScoringParams,
        process: &ProcessRecord,
        class: Classification,
        raw: i32,
    ) -> i32 {
        if raw < 0 {
            return raw;
        }
        if !class.high_priority {
            return self.compute_subprocess_adj(params, process, raw);
        }
        if class.hidden {
            return self.compute_hidden_adj(params, raw);
        }

        let target = if class.is_main {
            self.compute_main_process_adj(kind, params, raw, class.important_system)
        } else {
            self.compute_high_priority_subprocess_adj(kind, params, raw)
        };
        if kind.table().raises_ceiling {
            self.check_and_set_default_max_adj_if_need(process);
        }
        target
    }
}
