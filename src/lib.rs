pub mod shared {
    pub mod core {
        pub mod primitives;
    }
    pub mod infrastructure {
        pub mod cache;
        pub mod message_bus;
        pub mod sqlite;
    }
}

pub mod modules {
    pub mod backlog {
        pub mod core {
            pub mod cache_keys;
            pub mod events;
            pub mod evolve;
            pub mod filter;
            pub mod item;
            pub mod metrics;
        }
        pub mod application {
            pub mod cache_policy;
            pub mod commands;
            pub mod errors;
            pub mod metrics_aggregator;
            pub mod service;
        }
        pub mod adapters {
            pub mod inbound {
                pub mod http;
            }
            pub mod outbound {
                pub mod event_log;
                pub mod event_log_in_memory;
                pub mod event_log_sqlite;
                pub mod notifications;
                pub mod repository;
                pub mod repository_in_memory;
                pub mod repository_sqlite;
            }
        }
    }
}

pub mod shell;
