//! Pagination for task listings.

use serde::{Deserialize, Serialize};

use longshot_common::error::{LongshotError, LongshotResult};

use crate::task::TaskSummary;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A validated page request. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> LongshotResult<Self> {
        if page == 0 {
            return Err(LongshotError::config("page must be at least 1"));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(LongshotError::config(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE} (got {page_size})"
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }
}

/// One page of tasks, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    pub tasks: Vec<TaskSummary>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    /// At least 1, even when there are no tasks.
    pub total_pages: u64,
}

impl TaskPage {
    pub fn new(tasks: Vec<TaskSummary>, total_count: u64, request: &PageRequest) -> Self {
        let total_pages = total_count.div_ceil(request.page_size as u64).max(1);
        Self {
            tasks,
            total_count,
            page: request.page,
            page_size: request.page_size,
            total_pages,
        }
    }
}
