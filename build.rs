fn main() {
    // ESP-IDF environment propagation is only meaningful for on-target builds.
    if std::env::var("CARGO_FEATURE_ESP32").is_ok() {
        embuild::espidf::sysenv::output();
    }
}
