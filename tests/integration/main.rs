// Integration tests. Each module covers one area of the crate.
// Tests that need a running RabbitMQ are #[ignore]d; run them with
// `cargo test -- --ignored` once a broker is reachable (see messaging_test.rs).

mod config_test;
mod messaging_test;
