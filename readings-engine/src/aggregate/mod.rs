mod grid;
mod group;
mod meter;

pub use grid::{bar_grid, data_extent, LineResolution};
pub use group::{aggregate_group, deep_meters, group_period_total, sum_children, GroupInputs};
pub use meter::{
    aggregate, bar_buckets, bucketed_line_points, converted_bucket_values, native_bucket_values,
    period_total, raw_line_points, AggregationMode, BarBucket, LinePoint, MeterConversion, Series,
};
