use indexmap::IndexMap;
use itertools::Itertools;
use petgraph::algo::toposort;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::RenderGraphError;
use crate::render_pass::RenderPassInstance;

/// 拥有所有 pass 的渲染图
///
/// 图始终处于最近一次校验通过的状态：`add_pass` 校验失败时会撤销插入。
/// 执行顺序在 `add_pass` 时计算并缓存，`execute_all` 只按顺序调用。
pub struct RenderGraph<C> {
    /// 按注册顺序存放，互不依赖的 pass 之间以注册顺序为准
    passes: IndexMap<String, RenderPassInstance<C>>,
    /// passes 中的下标，拓扑有序
    order: Vec<usize>,
}
impl<C> Default for RenderGraph<C> {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl<C> RenderGraph<C> {
    pub fn new() -> Self {
        Self {
            passes: IndexMap::new(),
            order: Vec::new(),
        }
    }
}
// getter
impl<C> RenderGraph<C> {
    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.passes.contains_key(name)
    }

    #[inline]
    pub fn get_pass(&self, name: &str) -> Option<&RenderPassInstance<C>> {
        self.passes.get(name)
    }

    /// 执行顺序中的 pass 名称
    pub fn execution_order(&self) -> Vec<&str> {
        self.order.iter().map(|&index| self.passes[index].name()).collect()
    }

    /// 导出 Graphviz 格式，边从被依赖的 pass 指向依赖它的 pass
    pub fn to_dot(&self) -> String {
        let mut graph = DiGraph::<&str, &str>::with_capacity(self.passes.len(), self.passes.len() * 2);
        let nodes = self.passes.keys().map(|name| graph.add_node(name.as_str())).collect_vec();
        for (index, pass) in self.passes.values().enumerate() {
            for dependency in pass.dependencies() {
                if let Some(dependency_index) = self.passes.get_index_of(dependency.as_str()) {
                    graph.add_edge(nodes[dependency_index], nodes[index], "");
                }
            }
        }
        format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }
}
// tools
impl<C> RenderGraph<C> {
    /// 注册一个 pass
    ///
    /// # 返回
    /// - 名称已存在：拒绝，保留原来的 pass，图不做任何修改
    /// - 依赖不存在或者形成环：撤销插入，图回到调用前的状态
    pub fn add_pass(&mut self, pass: RenderPassInstance<C>) -> Result<(), RenderGraphError> {
        if self.passes.contains_key(pass.name()) {
            let error = RenderGraphError::DuplicatePass(pass.name().to_string());
            log::error!("RenderGraph: {}", error);
            return Err(error);
        }

        let (index, _) = self.passes.insert_full(pass.name().to_string(), pass);
        match Self::compute_order(&self.passes) {
            Ok(order) => {
                self.order = order;
                log::debug!("RenderGraph: order = [{}]", self.execution_order().iter().join(" -> "));
                Ok(())
            }
            Err(error) => {
                // 新插入的 pass 位于末尾，移除后其他 pass 的下标不变，缓存的顺序仍然有效
                self.passes.shift_remove_index(index);
                log::error!("RenderGraph: {}", error);
                Err(error)
            }
        }
    }

    /// 按拓扑顺序执行所有 pass
    ///
    /// pass 的闭包可以修改 context，排在后面的 pass 能看到这些修改。
    pub fn execute_all(&mut self, context: &mut C) {
        let _span = tracy_client::span!("RenderGraph::execute_all");
        for &index in &self.order {
            self.passes[index].execute(context);
        }
    }

    /// 移除所有 pass
    pub fn clear(&mut self) {
        self.passes.clear();
        self.order.clear();
    }

    /// 校验整张图并计算拓扑顺序
    ///
    /// 先检查所有依赖是否存在，再检查是否有环。
    fn compute_order(passes: &IndexMap<String, RenderPassInstance<C>>) -> Result<Vec<usize>, RenderGraphError> {
        let mut graph = DiGraph::<usize, ()>::with_capacity(passes.len(), passes.len() * 2);
        let nodes: Vec<NodeIndex> = (0..passes.len()).map(|index| graph.add_node(index)).collect();

        for (index, pass) in passes.values().enumerate() {
            for dependency in pass.dependencies() {
                let Some(dependency_index) = passes.get_index_of(dependency.as_str()) else {
                    return Err(RenderGraphError::MissingDependency {
                        pass: pass.name().to_string(),
                        dependency: dependency.clone(),
                    });
                };
                graph.add_edge(nodes[dependency_index], nodes[index], ());
            }
        }

        match toposort(&graph, None) {
            Ok(sorted) => Ok(sorted.into_iter().map(|node| graph[node]).collect()),
            Err(cycle) => Err(RenderGraphError::Cycle {
                pass: passes[graph[cycle.node_id()]].name().to_string(),
            }),
        }
    }
}
