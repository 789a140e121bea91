pub mod geometry;
pub mod path;
pub mod shape;
pub mod vehicle;

/// Representative instances, used for tests and demo data.
pub trait ExampleData {
    fn example_data() -> Self;
}
