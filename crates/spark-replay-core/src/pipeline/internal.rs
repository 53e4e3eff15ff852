//! Pipeline 内部的槽位竞技场（arena）。
//!
//! # 设计背景（Why）
//! - Handler 会在自己的回调中移除或替换自己，而同一次派发随后还要“找到下一个”；
//!   若用下标数组表示链路，结构变更会让正在进行的派发失去定位依据。
//! - 因此链路以竞技场保存槽位，槽位一经分配永不回收、不移动，句柄与下标一一对应。
//!
//! # 逻辑解析（How）
//! - 在位槽位之间以 `prev`/`next` 构成双向链表；
//! - 移除时只改写邻居的链接，被移除槽位保留自己的 `prev`/`next`，
//!   仍可从它出发找到后继；
//! - 替换时在原位置挂入新槽位，旧槽位记录 `successor`，发往旧位置的事件转交替换者。
//!
//! # 契约说明（What）
//! - 竞技场不执行任何 Handler 回调，所有方法都是纯数据结构操作，可在锁内调用；
//! - 不变式：沿 `next` 链前进的位置在链路中只会越来越靠后，因此解析过程必然终止。
//!
//! # 风险与考量（Trade-offs）
//! - 槽位不回收意味着频繁热插拔的长连接会线性增长少量内存；每个槽位仅持有标签与 `Arc`，
//!   对解码器自我移除这类“一次性”变更可以忽略。

use alloc::{string::String, sync::Arc, vec::Vec};

use crate::error::{CoreError, Result, codes};

use super::{
    handler::InboundHandler,
    pipeline::{HandlerRegistration, PipelineHandleId},
};

/// 槽位生命周期：`Present` → `Replaced | Removed`，后两者均为终态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotState {
    Present,
    Replaced { successor: usize },
    Removed,
}

pub(crate) struct Slot {
    pub(crate) id: PipelineHandleId,
    pub(crate) label: Arc<str>,
    pub(crate) handler: Arc<dyn InboundHandler>,
    prev: Option<usize>,
    next: Option<usize>,
    pub(crate) state: SlotState,
}

/// 一次解析的结果：派发目标的身份与实现。
#[derive(Clone)]
pub(crate) struct ResolvedSlot {
    pub(crate) id: PipelineHandleId,
    pub(crate) label: Arc<str>,
    pub(crate) handler: Arc<dyn InboundHandler>,
}

#[derive(Default)]
pub(crate) struct SlotArena {
    slots: Vec<Slot>,
    head: Option<usize>,
    tail: Option<usize>,
    present: usize,
}

impl SlotArena {
    fn index_of(id: PipelineHandleId) -> Option<usize> {
        if id.is_anchor() {
            return None;
        }
        usize::try_from(id.raw() - 1).ok()
    }

    fn slot(&self, id: PipelineHandleId) -> Option<(usize, &Slot)> {
        let index = Self::index_of(id)?;
        self.slots.get(index).map(|slot| (index, slot))
    }

    pub(crate) fn len(&self) -> usize {
        self.present
    }

    #[cfg(test)]
    pub(crate) fn state_of(&self, id: PipelineHandleId) -> Option<SlotState> {
        self.slot(id).map(|(_, slot)| slot.state)
    }

    fn ensure_unique(&self, label: &str, ignore: Option<usize>) -> Result<()> {
        let clash = self.iter_present().any(|(index, slot)| {
            Some(index) != ignore && &*slot.label == label
        });
        if clash {
            return Err(CoreError::new(
                codes::PIPELINE_HANDLER_CONFLICT,
                alloc::format!("handler label `{label}` already present"),
            ));
        }
        Ok(())
    }

    fn allocate(&mut self, label: &str, handler: Arc<dyn InboundHandler>) -> usize {
        let index = self.slots.len();
        self.slots.push(Slot {
            id: PipelineHandleId::new(index as u64 + 1),
            label: Arc::from(label),
            handler,
            prev: None,
            next: None,
            state: SlotState::Present,
        });
        index
    }

    /// 把 `index` 挂在 `after` 之后；`after == None` 表示链首。
    fn link_after(&mut self, after: Option<usize>, index: usize) {
        let next = match after {
            Some(prev) => self.slots[prev].next,
            None => self.head,
        };
        self.slots[index].prev = after;
        self.slots[index].next = next;
        match after {
            Some(prev) => self.slots[prev].next = Some(index),
            None => self.head = Some(index),
        }
        match next {
            Some(next) => self.slots[next].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.present += 1;
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = (self.slots[index].prev, self.slots[index].next);
        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }
        self.present -= 1;
    }

    /// 在锚点之后插入；锚点为 `HEAD` 时插入链首。已被替换的锚点解析到替换者。
    pub(crate) fn insert_after(
        &mut self,
        anchor: PipelineHandleId,
        label: &str,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<PipelineHandleId> {
        let after = if anchor.is_anchor() {
            None
        } else {
            Some(self.present_anchor(anchor)?)
        };
        self.ensure_unique(label, None)?;
        let index = self.allocate(label, handler);
        self.link_after(after, index);
        Ok(self.slots[index].id)
    }

    pub(crate) fn insert_last(
        &mut self,
        label: &str,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<PipelineHandleId> {
        self.ensure_unique(label, None)?;
        let index = self.allocate(label, handler);
        let tail = self.tail;
        self.link_after(tail, index);
        Ok(self.slots[index].id)
    }

    fn present_anchor(&self, anchor: PipelineHandleId) -> Result<usize> {
        let missing = || {
            CoreError::new(
                codes::PIPELINE_HANDLER_MISSING,
                alloc::format!("anchor handle {} is not present", anchor.raw()),
            )
        };
        let (mut index, _) = self.slot(anchor).ok_or_else(missing)?;
        loop {
            match self.slots[index].state {
                SlotState::Present => return Ok(index),
                SlotState::Replaced { successor } => index = successor,
                SlotState::Removed => return Err(missing()),
            }
        }
    }

    /// 移除在位槽位，返回被移除者；非在位句柄返回 `None`。
    pub(crate) fn remove(&mut self, id: PipelineHandleId) -> Option<ResolvedSlot> {
        let (index, slot) = self.slot(id)?;
        if slot.state != SlotState::Present {
            return None;
        }
        self.unlink(index);
        self.slots[index].state = SlotState::Removed;
        Some(self.resolved(index))
    }

    /// 原位替换，返回 `(替换者, 被替换者)`。
    pub(crate) fn replace(
        &mut self,
        id: PipelineHandleId,
        label: &str,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<(ResolvedSlot, ResolvedSlot)> {
        let index = match self.slot(id) {
            Some((index, slot)) if slot.state == SlotState::Present => index,
            _ => {
                return Err(CoreError::new(
                    codes::PIPELINE_HANDLER_MISSING,
                    alloc::format!("handle {} is not present", id.raw()),
                ));
            }
        };
        self.ensure_unique(label, Some(index))?;
        let successor = self.allocate(label, handler);
        let prev = self.slots[index].prev;
        self.unlink(index);
        self.link_after(prev, successor);
        self.slots[index].state = SlotState::Replaced { successor };
        // 旧槽位的链接保持不变，仍指向原邻居。
        Ok((self.resolved(successor), self.resolved(index)))
    }

    pub(crate) fn find(&self, label: &str) -> Option<PipelineHandleId> {
        self.iter_present()
            .find(|(_, slot)| &*slot.label == label)
            .map(|(_, slot)| slot.id)
    }

    pub(crate) fn registrations(&self) -> Vec<HandlerRegistration> {
        self.iter_present()
            .map(|(_, slot)| {
                HandlerRegistration::new(
                    slot.id,
                    String::from(&*slot.label),
                    slot.handler.describe(),
                )
            })
            .collect()
    }

    /// 解析“该位置当前的处理者”：在位即自身，被替换则追随替换者，被移除则顺延到其后。
    fn resolve_from(&self, mut cursor: Option<usize>) -> Option<usize> {
        while let Some(index) = cursor {
            match self.slots[index].state {
                SlotState::Present => return Some(index),
                SlotState::Replaced { successor } => cursor = Some(successor),
                SlotState::Removed => cursor = self.slots[index].next,
            }
        }
        None
    }

    /// 链首的第一个在位 Handler。
    pub(crate) fn first(&self) -> Option<ResolvedSlot> {
        self.resolve_from(self.head).map(|index| self.resolved(index))
    }

    /// 派发到指定位置：`HEAD` 等价于链首。
    pub(crate) fn at(&self, position: PipelineHandleId) -> Option<ResolvedSlot> {
        if position.is_anchor() {
            return self.first();
        }
        let (index, _) = self.slot(position)?;
        self.resolve_from(Some(index)).map(|index| self.resolved(index))
    }

    /// 从 `from` 转发时的目标：被替换的槽位转交替换者，否则沿 `next` 顺延。
    pub(crate) fn after(&self, from: PipelineHandleId) -> Option<ResolvedSlot> {
        if from.is_anchor() {
            return self.first();
        }
        let (index, slot) = self.slot(from)?;
        let start = match slot.state {
            SlotState::Replaced { successor } => Some(successor),
            SlotState::Present | SlotState::Removed => self.slots[index].next,
        };
        self.resolve_from(start).map(|index| self.resolved(index))
    }

    fn resolved(&self, index: usize) -> ResolvedSlot {
        let slot = &self.slots[index];
        ResolvedSlot {
            id: slot.id,
            label: Arc::clone(&slot.label),
            handler: Arc::clone(&slot.handler),
        }
    }

    fn iter_present(&self) -> PresentIter<'_> {
        PresentIter {
            arena: self,
            cursor: self.head,
        }
    }
}

struct PresentIter<'a> {
    arena: &'a SlotArena,
    cursor: Option<usize>,
}

impl<'a> Iterator for PresentIter<'a> {
    type Item = (usize, &'a Slot);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.arena.slots[index];
        self.cursor = slot.next;
        Some((index, slot))
    }
}
