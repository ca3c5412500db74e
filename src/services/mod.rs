pub(crate) mod archive_store;
pub(crate) mod distributor;
pub(crate) mod intake;
pub(crate) mod status_consumer;
pub(crate) mod work_queue;
