//! Market price port: the external price feed the engine reads from.

use std::future::Future;

use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::market::MarketPrice;

pub trait MarketPriceSource {
    /// Most recent known price, if any has been recorded.
    fn latest_price(&self)
    -> impl Future<Output = Result<Option<MarketPrice>, FieldHubError>> + Send;
}

impl<T: MarketPriceSource + Send + Sync> MarketPriceSource for std::sync::Arc<T> {
    fn latest_price(
        &self,
    ) -> impl Future<Output = Result<Option<MarketPrice>, FieldHubError>> + Send {
        (**self).latest_price()
    }
}
