/// 未识别区域时的回退区域。
pub const DEFAULT_REGION: &str = "eu";

/// 区域选择器 → OpenAPI 地址；未知区域回退到 eu。
pub fn base_url_for_region(region: &str) -> &'static str {
    match region.trim().to_ascii_lowercase().as_str() {
        "cn" => "https://openapi.tuyacn.com",
        "us" => "https://openapi.tuyaus.com",
        "in" => "https://openapi.tuyain.com",
        _ => "https://openapi.tuyaeu.com",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_regions_map_to_fixed_urls() {
        assert_eq!(base_url_for_region("cn"), "https://openapi.tuyacn.com");
        assert_eq!(base_url_for_region("US"), "https://openapi.tuyaus.com");
        assert_eq!(base_url_for_region("eu"), "https://openapi.tuyaeu.com");
        assert_eq!(base_url_for_region("in"), "https://openapi.tuyain.com");
    }

    #[test]
    fn unknown_region_falls_back_to_default() {
        assert_eq!(base_url_for_region("mars"), base_url_for_region(DEFAULT_REGION));
    }
}
