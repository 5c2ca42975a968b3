//! 导航游标 - 流程层
//!
//! 在 (旅客, 文档, 面) 三维空间上做确定性遍历：
//! 旅客在最外层，文档按目录顺序，双面文档先正面后背面。
//! 全部位置走完后进入终态 `ReviewAll`。
//!
//! 游标本身不做任何守卫判断，是否允许前进由 `IntakeSession` 决定。

use crate::models::document::Side;
use std::fmt::Display;

/// 游标位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub traveller: usize,
    pub document: usize,
    pub side: Side,
}

impl Position {
    pub const INITIAL: Position = Position {
        traveller: 0,
        document: 0,
        side: Side::Front,
    };

    pub fn new(traveller: usize, document: usize, side: Side) -> Self {
        Self {
            traveller,
            document,
            side,
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[旅客 {} 文档#{} {}]",
            self.traveller, self.document, self.side
        )
    }
}

/// 游标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// 正在收集某个位置
    At(Position),
    /// 所有位置都已经过，等待最终提交
    ReviewAll,
}

/// 导航游标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationCursor {
    traveller_count: usize,
    /// 每份文档是否需要正反两面，顺序即目录顺序
    layout: Vec<bool>,
    state: CursorState,
}

impl NavigationCursor {
    /// 创建游标，初始位置为 (0, 0, front)
    ///
    /// 网格为空时（没有旅客或没有文档）直接处于 `ReviewAll`。
    pub fn new(traveller_count: usize, layout: Vec<bool>) -> Self {
        let state = if traveller_count == 0 || layout.is_empty() {
            CursorState::ReviewAll
        } else {
            CursorState::At(Position::INITIAL)
        };
        Self {
            traveller_count,
            layout,
            state,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// 当前位置，`ReviewAll` 时为 `None`
    pub fn position(&self) -> Option<Position> {
        match self.state {
            CursorState::At(position) => Some(position),
            CursorState::ReviewAll => None,
        }
    }

    pub fn is_review_all(&self) -> bool {
        self.state == CursorState::ReviewAll
    }

    pub fn is_initial(&self) -> bool {
        self.state == CursorState::At(Position::INITIAL)
    }

    pub fn traveller_count(&self) -> usize {
        self.traveller_count
    }

    pub fn document_count(&self) -> usize {
        self.layout.len()
    }

    fn requires_both(&self, document: usize) -> bool {
        self.layout.get(document).copied().unwrap_or(false)
    }

    /// 从后往前进入某份文档时落在哪一面
    fn last_side(&self, document: usize) -> Side {
        if self.requires_both(document) {
            Side::Back
        } else {
            Side::Front
        }
    }

    fn last_position(&self) -> Option<Position> {
        if self.traveller_count == 0 || self.layout.is_empty() {
            return None;
        }
        let document = self.layout.len() - 1;
        Some(Position::new(
            self.traveller_count - 1,
            document,
            self.last_side(document),
        ))
    }

    /// 计算某个位置的下一位置，`None` 表示进入 `ReviewAll`
    fn next_of(&self, position: Position) -> Option<Position> {
        let Position {
            traveller,
            document,
            side,
        } = position;

        if side == Side::Front && self.requires_both(document) {
            return Some(Position::new(traveller, document, Side::Back));
        }
        if document + 1 < self.layout.len() {
            return Some(Position::new(traveller, document + 1, Side::Front));
        }
        if traveller + 1 < self.traveller_count {
            return Some(Position::new(traveller + 1, 0, Side::Front));
        }
        None
    }

    /// 计算某个位置的上一位置，`None` 表示已经是第一个位置
    fn prev_of(&self, position: Position) -> Option<Position> {
        let Position {
            traveller,
            document,
            side,
        } = position;

        if side == Side::Back && self.requires_both(document) {
            return Some(Position::new(traveller, document, Side::Front));
        }
        if document > 0 {
            let document = document - 1;
            return Some(Position::new(
                traveller,
                document,
                self.last_side(document),
            ));
        }
        if traveller > 0 {
            let document = self.layout.len().saturating_sub(1);
            return Some(Position::new(
                traveller - 1,
                document,
                self.last_side(document),
            ));
        }
        None
    }

    /// 前进一步，`ReviewAll` 时保持不变
    pub fn advance(&mut self) -> CursorState {
        if let CursorState::At(position) = self.state {
            self.state = match self.next_of(position) {
                Some(next) => CursorState::At(next),
                None => CursorState::ReviewAll,
            };
        }
        self.state
    }

    /// 后退一步
    ///
    /// 第一个位置上是空操作；从 `ReviewAll` 回到最后一个位置。
    pub fn retreat(&mut self) -> CursorState {
        self.state = match self.state {
            CursorState::At(position) => match self.prev_of(position) {
                Some(prev) => CursorState::At(prev),
                None => CursorState::At(position),
            },
            CursorState::ReviewAll => match self.last_position() {
                Some(last) => CursorState::At(last),
                None => CursorState::ReviewAll,
            },
        };
        self.state
    }

    /// 位置是否在网格内（单面文档没有背面）
    pub fn contains(&self, position: Position) -> bool {
        position.traveller < self.traveller_count
            && position.document < self.layout.len()
            && (position.side == Side::Front || self.requires_both(position.document))
    }

    /// 直接跳到某个位置（用于恢复进度），越界返回 `false`
    pub fn jump_to(&mut self, position: Position) -> bool {
        if !self.contains(position) {
            return false;
        }
        self.state = CursorState::At(position);
        true
    }

    pub fn finish(&mut self) {
        self.state = CursorState::ReviewAll;
    }

    /// 按前进顺序列出全部位置
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        let first = (self.traveller_count > 0 && !self.layout.is_empty())
            .then_some(Position::INITIAL);
        std::iter::successors(first, move |position| self.next_of(*position))
    }

    /// 总体进度：`(traveller * docs + document + 1) / (travellers * docs)`
    pub fn completion(&self) -> f64 {
        let total = self.traveller_count * self.layout.len();
        match self.state {
            CursorState::ReviewAll => 1.0,
            CursorState::At(_) if total == 0 => 1.0,
            CursorState::At(position) => {
                let done = position.traveller * self.layout.len() + position.document + 1;
                done as f64 / total as f64
            }
        }
    }
}
