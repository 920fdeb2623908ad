//! Domain records produced by the kernel: orders in flight and the
//! per-day metrics snapshot the KPI calculator consumes.

/// A replenishment order between creation and arrival.
#[derive(Debug, Clone, Copy)]
pub struct OrderInTransit {
    pub(crate) id: u64,
    /// Quantity on order, in metric tons.
    pub quantity_tm: f64,
    /// Lead time fixed at order creation, in days.
    pub lead_time_days: f64,
    /// Simulation time (fractional days) the order was placed.
    pub creation_day: f64,
}

/// One day's worth of hub state and flow, recorded once per demand tick.
#[derive(Debug, Clone, Copy)]
pub struct DailyMetrics {
    /// Day index (0-based).
    pub day: u32,
    /// Inventory level at the moment of the day's demand tick, after dispatch.
    pub inventory_tm: f64,
    /// Demand realized this day.
    pub demand_tm: f64,
    /// Demand actually satisfied from stock this day.
    pub satisfied_demand_tm: f64,
    /// Supply credited to this day. Credited to whichever day was most
    /// recently recorded at the time a shipment arrives, not necessarily
    /// the day containing the arrival instant.
    pub supply_received_tm: f64,
    /// Whether satisfied demand fell short of realized demand.
    pub stockout: bool,
    /// Whether the route was blocked at the moment of this day's tick.
    pub route_blocked: bool,
    /// Number of orders in transit at the moment of this day's tick.
    pub pending_orders: usize,
    /// Inventory level divided by today's demand (0 if demand is 0).
    pub autonomy_days: f64,
}

/// A single point of the exported demand/inventory/supply time series,
/// mirroring [`DailyMetrics`] in a shape meant for serialization.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TimeSeriesPoint {
    pub day: u32,
    pub inventory_tm: f64,
    pub demand_tm: f64,
    pub satisfied_demand_tm: f64,
    pub supply_received_tm: f64,
    pub stockout: bool,
    pub route_blocked: bool,
    pub pending_orders: usize,
    pub autonomy_days: f64,
}

impl From<&DailyMetrics> for TimeSeriesPoint {
    fn from(m: &DailyMetrics) -> Self {
        Self {
            day: m.day,
            inventory_tm: m.inventory_tm,
            demand_tm: m.demand_tm,
            satisfied_demand_tm: m.satisfied_demand_tm,
            supply_received_tm: m.supply_received_tm,
            stockout: m.stockout,
            route_blocked: m.route_blocked,
            pending_orders: m.pending_orders,
            autonomy_days: m.autonomy_days,
        }
    }
}
