//! 执行器能力接口
//!
//! 设备门面按自身能力实现这些 trait，上层控制逻辑只依赖接口。

/// 可喂食（看门狗）
pub trait Feedable {
    fn feed(&self);
}

/// 速度指令执行器
pub trait SpeedCommandable {
    type Error;

    /// 下发 [-1, 1] 输出，同时喂食看门狗
    fn set(&self, value: f64) -> Result<(), Self::Error>;

    /// 最近一次下发的输出
    fn get(&self) -> f64;

    fn disable(&self) -> Result<(), Self::Error>;

    /// 看门狗超时路径：停止输出且不喂食
    fn stop_motor(&self) -> Result<(), Self::Error>;
}

/// 带参数校验的设备
pub trait Verifiable {
    type Key;

    fn all_verified(&self) -> bool;

    fn stuck_parameters(&self) -> Vec<Self::Key>;
}
