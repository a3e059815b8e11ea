pub(crate) mod assistant;
pub(crate) mod batch_orchestrator;
pub(crate) mod export;
pub(crate) mod marking_client;
pub(crate) mod result_aggregator;
pub(crate) mod result_sorter;
pub(crate) mod uploads;
