//! Phase 1: sort cost lines into behaviour buckets.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

use super::{Feedback, PhaseCtx, PhaseDetail, PhaseError, PhaseId, PhaseRules, Verdict};
use crate::constants::DEFAULT_MISTAKE_SEVERITY;
use crate::cost_model::{CostDescriptor, CostType, classify};
use crate::state::Topic;

/// A cost line the player has to classify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostItem {
    pub id: String,
    pub name: String,
    /// Display string such as `$0.12/cup`.
    pub amount_label: String,
    pub description: String,
    pub descriptor: CostDescriptor,
    /// Authored answer; catalog validation checks it against `classify`.
    pub label: CostType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationScenario {
    pub title: String,
    pub items: Vec<CostItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub item_id: String,
    pub bucket: CostType,
}

/// Pending and placed items for the current scenario, by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortingTray {
    pending: SmallVec<[usize; 8]>,
    placed: BTreeMap<CostType, Vec<usize>>,
}

impl SortingTray {
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_pending(&self, index: usize) -> bool {
        self.pending.contains(&index)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationRules;

/// Item as shown to the player; the answer is withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCard {
    pub id: String,
    pub name: String,
    pub amount_label: String,
    pub description: String,
}

impl From<&CostItem> for ItemCard {
    fn from(item: &CostItem) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            amount_label: item.amount_label.clone(),
            description: item.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationView {
    pub title: String,
    pub pending: Vec<ItemCard>,
    pub placed: BTreeMap<CostType, Vec<ItemCard>>,
}

impl PhaseRules for ClassificationRules {
    type Scenario = ClassificationScenario;
    type Action = Assignment;
    type Local = SortingTray;

    const PHASE: PhaseId = PhaseId::Classification;

    fn prepare(&self, scenario: &ClassificationScenario) -> SortingTray {
        SortingTray {
            pending: (0..scenario.items.len()).collect(),
            placed: BTreeMap::new(),
        }
    }

    fn evaluate(
        &self,
        scenario: &ClassificationScenario,
        tray: &mut SortingTray,
        action: Assignment,
        _ctx: &mut PhaseCtx<'_>,
    ) -> Result<Verdict, PhaseError> {
        let index = scenario
            .items
            .iter()
            .position(|item| item.id == action.item_id)
            .ok_or_else(|| PhaseError::UnknownItem(action.item_id.clone()))?;
        let Some(slot) = tray.pending.iter().position(|&pending| pending == index) else {
            return Err(PhaseError::ItemAlreadyPlaced(action.item_id));
        };
        let item = &scenario.items[index];

        if classify(&item.descriptor) != action.bucket {
            return Ok(Verdict::Mistake {
                topic: Topic::Classification,
                severity: DEFAULT_MISTAKE_SEVERITY,
                feedback: Feedback::warning(format!(
                    "{} is not a {} cost.",
                    item.name, action.bucket
                ))
                .with_hint(action.bucket.rule_hint()),
            });
        }

        tray.pending.remove(slot);
        tray.placed.entry(action.bucket).or_default().push(index);
        if tray.pending.is_empty() {
            Ok(Verdict::Solved {
                feedback: Feedback::success(format!("{} sorted. Every cost is in its bucket.", scenario.title)),
            })
        } else {
            Ok(Verdict::Progress {
                feedback: Feedback::success(format!(
                    "Correct! {} is {}. {}",
                    item.name,
                    action.bucket.label(),
                    action.bucket.definition()
                )),
            })
        }
    }

    fn detail(&self, scenario: &ClassificationScenario, tray: &SortingTray) -> PhaseDetail {
        let pending = tray
            .pending
            .iter()
            .map(|&index| ItemCard::from(&scenario.items[index]))
            .collect();
        let placed = tray
            .placed
            .iter()
            .map(|(bucket, indices)| {
                let cards = indices
                    .iter()
                    .map(|&index| ItemCard::from(&scenario.items[index]))
                    .collect();
                (*bucket, cards)
            })
            .collect();
        PhaseDetail::Classification(ClassificationView {
            title: scenario.title.clone(),
            pending,
            placed,
        })
    }
}
