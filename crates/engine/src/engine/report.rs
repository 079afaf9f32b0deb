use std::collections::BTreeMap;

use rma_storage::{CaseFilter, EventFilter, ReturnStore};

use super::Engine;
use crate::error::EngineError;
use crate::sla::{
    classify_logistics_exceptions, summarize_exceptions, time_in_stage, CaseExceptions,
    LogisticsException, StageAge,
};

impl<S: ReturnStore + ?Sized> Engine<S> {
    /// Stage age and SLA state for every case matching `filter`.
    pub async fn time_in_stage(&self, filter: &CaseFilter) -> Result<Vec<StageAge>, EngineError> {
        let now = self.clock.now();
        let cases = self.list_cases(filter).await?;
        let mut ages = Vec::with_capacity(cases.len());
        for case in &cases {
            let events = self
                .store
                .list_service_events(&EventFilter::for_case(&case.id))
                .await?;
            ages.push(time_in_stage(case, &events, now));
        }
        Ok(ages)
    }

    /// Cases matching `filter` that have at least one logistics exception.
    pub async fn logistics_exceptions(
        &self,
        filter: &CaseFilter,
    ) -> Result<Vec<CaseExceptions>, EngineError> {
        let now = self.clock.now();
        Ok(self
            .list_cases(filter)
            .await?
            .into_iter()
            .filter_map(|case| {
                let exception_types = classify_logistics_exceptions(&case, now);
                (!exception_types.is_empty()).then_some(CaseExceptions {
                    case,
                    exception_types,
                })
            })
            .collect())
    }

    /// Exception counts by type.
    pub async fn exception_summary(
        &self,
        filter: &CaseFilter,
    ) -> Result<BTreeMap<LogisticsException, usize>, EngineError> {
        Ok(summarize_exceptions(&self.logistics_exceptions(filter).await?))
    }
}
