//! Campaign cost model
//!
//! Pure pricing math: tier classification from channel, content byte length
//! and media, plus the monthly free-credit apportionment. The same quote
//! function prices the pre-dispatch estimate and the settlement, so an
//! all-success campaign bills exactly what it quoted.

use reach_core::models::Channel;
use reach_core::traits::ChannelHint;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::constants::{
    BRAND_IMAGE_PRICE, BRAND_TEXT_PRICE, LONG_MESSAGE_PRICE, MEDIA_MESSAGE_PRICE,
    SHORT_BYTE_LIMIT, SHORT_MESSAGE_PRICE,
};

/// Price tier for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Short,
    Long,
    Media,
    BrandText,
    BrandImage,
}

impl CostTier {
    /// Unit price for this tier
    pub fn price(&self) -> Decimal {
        match self {
            CostTier::Short => SHORT_MESSAGE_PRICE,
            CostTier::Long => LONG_MESSAGE_PRICE,
            CostTier::Media => MEDIA_MESSAGE_PRICE,
            CostTier::BrandText => BRAND_TEXT_PRICE,
            CostTier::BrandImage => BRAND_IMAGE_PRICE,
        }
    }

    /// The gateway hint this tier sends as
    pub fn hint(&self) -> ChannelHint {
        match self {
            CostTier::Short => ChannelHint::Short,
            CostTier::Long => ChannelHint::Long,
            CostTier::Media => ChannelHint::Media,
            CostTier::BrandText | CostTier::BrandImage => ChannelHint::Rich,
        }
    }
}

/// Billed byte length of message text.
///
/// ASCII code points count 1 byte, everything above counts 2, matching the
/// provider's length accounting rather than UTF-8 encoded size.
pub fn byte_length(text: &str) -> usize {
    text.chars()
        .map(|c| if (c as u32) > 127 { 2 } else { 1 })
        .sum()
}

/// Classify the price tier for a message.
///
/// Media overrides the text tiers regardless of length.
pub fn tier_for(channel: Channel, content: &str, has_media: bool) -> CostTier {
    match channel {
        Channel::Brand => {
            if has_media {
                CostTier::BrandImage
            } else {
                CostTier::BrandText
            }
        }
        Channel::Sms => {
            if has_media {
                CostTier::Media
            } else if byte_length(content) <= SHORT_BYTE_LIMIT {
                CostTier::Short
            } else {
                CostTier::Long
            }
        }
    }
}

/// Priced campaign quote
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub target_count: i32,
    pub byte_length: usize,
    pub tier: CostTier,
    pub cost_per_message: Decimal,
    /// Sends covered by the monthly free allowance
    pub free_count: i32,
    /// Sends billed at the unit price
    pub paid_count: i32,
    /// Credits left before this campaign consumes any
    pub remaining_credits: i32,
    pub total_cost: Decimal,
}

impl Quote {
    /// Price a campaign.
    ///
    /// Free credits apply to Brand campaigns only; they cover the first
    /// `min(remaining_credits, target_count)` sends at zero cost.
    pub fn calculate(
        channel: Channel,
        content: &str,
        has_media: bool,
        target_count: i32,
        remaining_credits: i32,
    ) -> Self {
        let tier = tier_for(channel, content, has_media);
        let cost_per_message = tier.price();

        let free_count = if channel == Channel::Brand {
            remaining_credits.max(0).min(target_count)
        } else {
            0
        };
        let paid_count = target_count - free_count;
        let total_cost = cost_per_message * Decimal::from(paid_count);

        Self {
            target_count,
            byte_length: byte_length(content),
            tier,
            cost_per_message,
            free_count,
            paid_count,
            remaining_credits,
            total_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_byte_length_ascii_and_wide() {
        assert_eq!(byte_length("hello"), 5);
        assert_eq!(byte_length("안녕"), 4);
        assert_eq!(byte_length("hi 안녕"), 7);
        assert_eq!(byte_length(""), 0);
    }

    #[test]
    fn test_tier_boundary_at_limit() {
        let at_limit = "a".repeat(SHORT_BYTE_LIMIT);
        assert_eq!(tier_for(Channel::Sms, &at_limit, false), CostTier::Short);

        let over_limit = "a".repeat(SHORT_BYTE_LIMIT + 1);
        assert_eq!(tier_for(Channel::Sms, &over_limit, false), CostTier::Long);

        // 45 wide chars is exactly 90 bytes, one more crosses the limit
        let wide = "가".repeat(45);
        assert_eq!(tier_for(Channel::Sms, &wide, false), CostTier::Short);
        let wide_over = "가".repeat(46);
        assert_eq!(tier_for(Channel::Sms, &wide_over, false), CostTier::Long);
    }

    #[test]
    fn test_media_overrides_length() {
        assert_eq!(tier_for(Channel::Sms, "hi", true), CostTier::Media);
        let long = "a".repeat(500);
        assert_eq!(tier_for(Channel::Sms, &long, true), CostTier::Media);
    }

    #[test]
    fn test_brand_tiers() {
        assert_eq!(tier_for(Channel::Brand, "hi", false), CostTier::BrandText);
        assert_eq!(tier_for(Channel::Brand, "hi", true), CostTier::BrandImage);
        assert_eq!(CostTier::BrandText.price(), dec!(200));
        assert_eq!(CostTier::BrandImage.price(), dec!(230));
    }

    #[test]
    fn test_quote_free_credit_apportionment() {
        // 100 targets, 30 credits left: 30 free, 70 paid
        let quote = Quote::calculate(Channel::Brand, "hello", false, 100, 30);
        assert_eq!(quote.free_count, 30);
        assert_eq!(quote.paid_count, 70);
        assert_eq!(quote.total_cost, dec!(14000));

        // more credits than targets: everything free
        let quote = Quote::calculate(Channel::Brand, "hello", false, 10, 30);
        assert_eq!(quote.free_count, 10);
        assert_eq!(quote.paid_count, 0);
        assert_eq!(quote.total_cost, dec!(0));
    }

    #[test]
    fn test_quote_sms_ignores_credits() {
        let quote = Quote::calculate(Channel::Sms, "hello", false, 10, 30);
        assert_eq!(quote.free_count, 0);
        assert_eq!(quote.paid_count, 10);
        assert_eq!(quote.total_cost, dec!(500));
    }

    #[test]
    fn test_estimate_matches_all_success_settlement() {
        let quote = Quote::calculate(Channel::Brand, "hello", false, 50, 20);

        // settlement for an all-success run: free sends cost zero, the
        // rest cost the unit price
        let settled = quote.cost_per_message * Decimal::from(quote.paid_count);
        assert_eq!(settled, quote.total_cost);
    }
}
