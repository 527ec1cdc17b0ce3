//! 配置模块测试
