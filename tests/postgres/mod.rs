mod command_engine;
mod event_store;
mod poisoned_event;
mod projection;
mod tenant_isolation;
