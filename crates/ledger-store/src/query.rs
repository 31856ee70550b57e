use domain::OrderStatus;

/// Builder for listing orders.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by current status.
    pub status: Option<OrderStatus>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the order matches the filters.
    pub fn matches(&self, status: OrderStatus) -> bool {
        self.status.is_none_or(|wanted| wanted == status)
    }
}
