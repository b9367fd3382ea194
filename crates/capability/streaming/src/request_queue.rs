//! 待激活点位队列。

use domain::PointIdentity;
use std::collections::{HashSet, VecDeque};

/// 待建立通道的点位，按入队顺序排列，点位 ID 去重。
#[derive(Debug, Default)]
pub struct RequestQueue {
    points: VecDeque<PointIdentity>,
    ids: HashSet<String>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn contains(&self, point_id: &str) -> bool {
        self.ids.contains(point_id)
    }

    /// 入队；已存在时返回 false。
    pub fn push(&mut self, point: PointIdentity) -> bool {
        if !self.ids.insert(point.id.clone()) {
            return false;
        }
        self.points.push_back(point);
        true
    }

    /// 从队首取出最多 `max` 个点位。
    pub fn take_batch(&mut self, max: usize) -> Vec<PointIdentity> {
        let count = max.min(self.points.len());
        let batch: Vec<PointIdentity> = self.points.drain(..count).collect();
        for point in &batch {
            self.ids.remove(&point.id);
        }
        batch
    }

    /// 清空队列，返回清除数量。
    pub fn clear(&mut self) -> usize {
        let count = self.points.len();
        self.points.clear();
        self.ids.clear();
        count
    }

    pub fn snapshot(&self) -> Vec<PointIdentity> {
        self.points.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str) -> PointIdentity {
        PointIdentity::new(id, id, format!(r"\\pi\{}", id))
    }

    #[test]
    fn push_dedups_by_id() {
        let mut queue = RequestQueue::new();
        assert!(queue.push(point("p1")));
        assert!(!queue.push(point("p1")));
        assert!(queue.push(point("p2")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn take_batch_preserves_order_and_releases_ids() {
        let mut queue = RequestQueue::new();
        for id in ["p1", "p2", "p3"] {
            queue.push(point(id));
        }
        let batch = queue.take_batch(2);
        let ids: Vec<&str> = batch.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert!(!queue.contains("p1"));
        assert!(queue.contains("p3"));
        assert_eq!(queue.take_batch(10).len(), 1);
        assert!(queue.is_empty());
    }
}
