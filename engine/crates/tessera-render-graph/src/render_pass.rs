use std::fmt;

use ash::vk;

/// pass 的种类，只用于调试与统计，不影响调度
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderPassType {
    Geometry,
    Lighting,
    Composite,
    Present,
    Ui,
    Compute,
    #[default]
    Custom,
}

/// pass 写入的 target 以及 attachment 格式
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderPassLayout {
    /// texture registry 中 target 的名称
    pub target: Option<String>,
    pub color_formats: Vec<vk::Format>,
    /// 没有深度 attachment 时为 UNDEFINED
    pub depth_format: vk::Format,
}
impl RenderPassLayout {
    pub fn new(target: impl Into<String>, color_formats: impl Into<Vec<vk::Format>>) -> Self {
        Self {
            target: Some(target.into()),
            color_formats: color_formats.into(),
            depth_format: vk::Format::UNDEFINED,
        }
    }

    #[inline]
    pub fn with_depth(mut self, depth_format: vk::Format) -> Self {
        self.depth_format = depth_format;
        self
    }
}

pub type PassExecuteFn<C> = Box<dyn FnMut(&mut C)>;

/// 渲染图中的一个节点
///
/// 名称在图中唯一；依赖按名称声明，被依赖的 pass 必须先注册。
pub struct RenderPassInstance<C> {
    name: String,
    pass_type: RenderPassType,
    dependencies: Vec<String>,
    layout: RenderPassLayout,
    execute: PassExecuteFn<C>,

    /// 至少成功执行过一次，之后不会被清除
    completed: bool,
    execution_count: u64,
}
// new & init
impl<C> RenderPassInstance<C> {
    pub fn new(name: impl Into<String>, execute: impl FnMut(&mut C) + 'static) -> Self {
        Self {
            name: name.into(),
            pass_type: RenderPassType::default(),
            dependencies: Vec::new(),
            layout: RenderPassLayout::default(),
            execute: Box::new(execute),
            completed: false,
            execution_count: 0,
        }
    }

    #[inline]
    pub fn with_type(mut self, pass_type: RenderPassType) -> Self {
        self.pass_type = pass_type;
        self
    }

    /// 追加一个依赖，重复的名称会被忽略
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn with_dependencies<I, S>(self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        dependencies.into_iter().fold(self, |pass, dependency| pass.depends_on(dependency))
    }

    #[inline]
    pub fn with_layout(mut self, layout: RenderPassLayout) -> Self {
        self.layout = layout;
        self
    }
}
// getter
impl<C> RenderPassInstance<C> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn pass_type(&self) -> RenderPassType {
        self.pass_type
    }

    #[inline]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    #[inline]
    pub fn layout(&self) -> &RenderPassLayout {
        &self.layout
    }

    #[inline]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[inline]
    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }
}
// tools
impl<C> RenderPassInstance<C> {
    pub(crate) fn execute(&mut self, context: &mut C) {
        (self.execute)(context);
        self.completed = true;
        self.execution_count += 1;
    }
}
impl<C> fmt::Debug for RenderPassInstance<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPassInstance")
            .field("name", &self.name)
            .field("pass_type", &self.pass_type)
            .field("dependencies", &self.dependencies)
            .field("layout", &self.layout)
            .field("completed", &self.completed)
            .field("execution_count", &self.execution_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let pass = RenderPassInstance::<u32>::new("lighting", |counter| *counter += 1)
            .with_type(RenderPassType::Lighting)
            .with_dependencies(["gbuffer", "shadow"])
            .depends_on("gbuffer")
            .with_layout(RenderPassLayout::new("lighting", [vk::Format::R16G16B16A16_SFLOAT]));

        assert_eq!(pass.name(), "lighting");
        assert_eq!(pass.pass_type(), RenderPassType::Lighting);
        assert_eq!(pass.dependencies(), ["gbuffer".to_string(), "shadow".to_string()]);
        assert_eq!(pass.layout().target.as_deref(), Some("lighting"));
        assert_eq!(pass.layout().depth_format, vk::Format::UNDEFINED);
        assert!(!pass.completed());
    }

    #[test]
    fn test_execute_marks_completed() {
        let mut pass = RenderPassInstance::new("count", |counter: &mut u32| *counter += 1);
        let mut counter = 0;
        pass.execute(&mut counter);
        pass.execute(&mut counter);
        assert_eq!(counter, 2);
        assert!(pass.completed());
        assert_eq!(pass.execution_count(), 2);
    }
}
