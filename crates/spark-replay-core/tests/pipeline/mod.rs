//! 热插拔链路的集成测试入口。

mod hot_swap;
mod registry;
