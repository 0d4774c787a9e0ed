pub mod kafka_consumer;
pub mod redis_bus;

pub use kafka_consumer::EventLogConsumer;
pub use redis_bus::RedisRoutingBus;
