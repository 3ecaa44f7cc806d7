//! RseSelector - 対象 RSE の解決
//!
//! Precedence:
//! 1. An explicit endpoint list, when given, is the whole universe and the
//!    expressions are ignored. Every listed name must exist.
//! 2. Otherwise: include expression (everything if absent), plus greedy
//!    endpoints, minus the exclude expression.
//! 3. VO filter last; an empty filter keeps every VO.
//!
//! An empty result is a configuration error.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use crate::domain::{ReaperError, Rse, RseExpression, RseId};
use crate::ports::Catalog;

#[derive(Debug, Clone, Default)]
pub struct RseSelector {
    include: Option<RseExpression>,
    exclude: Option<RseExpression>,
    explicit: Vec<RseId>,
    vos: BTreeSet<String>,
}

impl RseSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse optional include/exclude expressions; blank strings count as absent.
    pub fn from_expressions(
        include: Option<&str>,
        exclude: Option<&str>,
    ) -> Result<Self, ReaperError> {
        let parse = |s: Option<&str>| -> Result<Option<RseExpression>, ReaperError> {
            match s.map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => Ok(Some(RseExpression::parse(s)?)),
                None => Ok(None),
            }
        };
        Ok(Self {
            include: parse(include)?,
            exclude: parse(exclude)?,
            ..Self::default()
        })
    }

    pub fn with_include(mut self, expr: RseExpression) -> Self {
        self.include = Some(expr);
        self
    }

    pub fn with_exclude(mut self, expr: RseExpression) -> Self {
        self.exclude = Some(expr);
        self
    }

    pub fn with_rses<I, S>(mut self, rses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.explicit = rses.into_iter().map(RseId::new).collect();
        self
    }

    pub fn with_vos<I, S>(mut self, vos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vos = vos.into_iter().map(Into::into).collect();
        self
    }

    /// Apply the selection rules to `rses`. Output is sorted by name.
    pub fn select(&self, rses: &[Rse]) -> Result<Vec<Rse>, ReaperError> {
        let by_id: BTreeMap<&RseId, &Rse> = rses.iter().map(|r| (&r.id, r)).collect();

        let chosen: BTreeSet<RseId> = if self.explicit.is_empty() {
            let mut set = match &self.include {
                Some(expr) => expr.evaluate(rses),
                None => rses.iter().map(|r| r.id.clone()).collect(),
            };
            set.extend(rses.iter().filter(|r| r.greedy).map(|r| r.id.clone()));
            if let Some(expr) = &self.exclude {
                let excluded = expr.evaluate(rses);
                set.retain(|id| !excluded.contains(id));
            }
            set
        } else {
            let mut set = BTreeSet::new();
            for id in &self.explicit {
                if !by_id.contains_key(id) {
                    return Err(ReaperError::UnknownRse(id.clone()));
                }
                set.insert(id.clone());
            }
            set
        };

        let selected: Vec<Rse> = chosen
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .filter(|rse| self.vos.is_empty() || self.vos.contains(&rse.vo))
            .cloned()
            .collect();

        if selected.is_empty() {
            return Err(ReaperError::configuration(
                "no rse matches the selection; check include/exclude expressions, rses and vos",
            ));
        }
        Ok(selected)
    }

    #[instrument(skip_all)]
    pub async fn resolve(&self, catalog: &dyn Catalog) -> Result<Vec<Rse>, ReaperError> {
        let all = catalog.list_rses().await?;
        let selected = self.select(&all)?;
        debug!(
            known = all.len(),
            selected = selected.len(),
            "resolved rses"
        );
        Ok(selected)
    }
}
