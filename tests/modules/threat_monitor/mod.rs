//! 可疑请求检测模块测试

#[allow(unused_imports)]
pub mod integration;
