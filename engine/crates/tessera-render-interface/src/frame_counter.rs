use std::time::{Duration, Instant};

pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,

    frame_start: Instant,
    /// 上一帧的耗时
    delta_time: Duration,
    /// 从创建到现在经过的时间
    total_time: Duration,
}
impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(0)
    }
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64) -> Self {
        Self {
            frame_id: init_frame_id,
            frame_start: Instant::now(),
            delta_time: Duration::ZERO,
            total_time: Duration::ZERO,
        }
    }
}
// update
impl FrameCounter {
    /// 帧末调用，帧序号递增并记录本帧耗时
    #[inline]
    pub fn next_frame(&mut self) {
        let now = Instant::now();
        self.delta_time = now - self.frame_start;
        self.total_time += self.delta_time;
        self.frame_start = now;

        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn delta_time(&self) -> Duration {
        self.delta_time
    }

    #[inline]
    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    /// 双缓冲中本帧写入的位置
    #[inline]
    pub fn buffer_parity(&self) -> usize {
        (self.frame_id % 2) as usize
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}]", self.frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_frame() {
        let mut counter = FrameCounter::new(41);
        assert_eq!(counter.frame_name(), "[F41]");
        assert_eq!(counter.buffer_parity(), 1);

        counter.next_frame();
        assert_eq!(counter.frame_id(), 42);
        assert_eq!(counter.buffer_parity(), 0);
        assert!(counter.total_time() >= counter.delta_time());
    }

    #[test]
    fn test_wraps() {
        let mut counter = FrameCounter::new(u64::MAX);
        counter.next_frame();
        assert_eq!(counter.frame_id(), 0);
    }
}
