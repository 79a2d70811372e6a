//! Shared AWS SDK configuration loading.

/// Load the AWS SDK configuration from the standard provider chain, pinning
/// the region when one is configured.
pub async fn load_sdk_config(region: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::from_env();
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    loader.load().await
}
