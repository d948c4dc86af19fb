pub mod yields;
