//! 窗口计数模块测试
