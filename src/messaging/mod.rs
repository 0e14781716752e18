mod consumer;
mod dispatcher;
mod rabbit;

pub use consumer::{ConsumerError, Job, JobConsumer};
pub use dispatcher::{DispatchError, JobDispatcher};
pub use rabbit::{
    build_pool, Pool, RabbitError, JOBS_EXCHANGE, JOBS_QUEUE, JOBS_ROUTING_KEY,
};
