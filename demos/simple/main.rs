use optimizely::{AttributeValue, DecideOption, NotificationType};

pub fn main() -> optimizely::Result<()> {
    // Configure env_logger to see Optimizely SDK logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("optimizely")).init();

    let sdk_key = std::env::var("OPTIMIZELY_SDK_KEY")
        .expect("OPTIMIZELY_SDK_KEY env variable should contain SDK key");
    let flag_key =
        std::env::var("OPTIMIZELY_FLAG_KEY").unwrap_or_else(|_| "checkout_flow".to_owned());

    let client = optimizely::ClientConfig::from_sdk_key(sdk_key).to_client()?;
    client
        .notification_center()
        .add(NotificationType::LogEvent, |notification| {
            println!("Dispatched event batch: {:?}", notification);
        });

    // Block waiting for configuration. Until this call returns, decisions are disabled.
    if let Err(err) = client.wait_for_configuration() {
        println!("error requesting configuration: {:?}", err);
    }

    let mut user = client.create_user_context(
        "test-user",
        [("country".to_owned(), AttributeValue::from("US"))].into(),
    );
    user.set_attribute("age", 30);

    let decision = user.decide(&flag_key, &[DecideOption::IncludeReasons]);
    println!("{}", serde_json::to_string_pretty(&decision).unwrap());

    if let Err(err) = user.track_event("purchase", [("revenue".to_owned(), 4200.into())].into()) {
        println!("error tracking event: {:?}", err);
    }

    // Flush pending events before exiting.
    client.close()
}
